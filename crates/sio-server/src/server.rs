use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sio_protocol::{Packet, PacketType, Value};

use crate::engine::{Engine, Frame};
use crate::error::Error;
use crate::manager::{AckCallback, EmitSink, Manager};
use crate::namespace_handler::NamespaceHandler;
use crate::ServerConfig;

/// Called once per connecting sid per namespace (§4.3). Returning `Ok` admits
/// the connection; `Err` drives the reject/refuse protocol.
pub type ConnectHandler =
    Arc<dyn Fn(String, serde_json::Value) -> BoxFuture<'static, Result<(), ConnectError>> + Send + Sync>;

/// Called once for a sid leaving a namespace, after the manager has already
/// forgotten it would be wrong — disconnect handlers still see `get_rooms`
/// et al, so the manager entry is removed *after* this runs.
pub type DisconnectHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// An event handler. Its return value becomes the `ACK` payload when the
/// triggering `EVENT` packet carried an id; ignored otherwise.
pub type EventHandler = Arc<dyn Fn(String, Vec<Value>) -> BoxFuture<'static, AckReply> + Send + Sync>;

/// Outcome of a rejected connect handler (§4.3, §7.2).
#[derive(Debug, Clone)]
pub enum ConnectError {
    /// Plain rejection: no `ERROR` packet, no `CONNECT` packet, unless
    /// `ServerConfig::always_connect` is set.
    Rejected,
    /// Refuse with an `ERROR` packet carrying `payload`.
    Refused(Option<serde_json::Value>),
}

/// What an event handler hands back to be serialized into the `ACK` packet
/// (§9, "Ack reply shape"). `Multi` is what a tuple/list return maps to;
/// `Single` is a bare scalar or object.
#[derive(Debug, Clone)]
pub enum AckReply {
    None,
    Single(Value),
    Multi(Vec<Value>),
}

impl AckReply {
    fn into_args(self) -> Vec<Value> {
        match self {
            AckReply::None => Vec::new(),
            AckReply::Single(v) => vec![v],
            AckReply::Multi(values) => values,
        }
    }
}

impl From<Value> for AckReply {
    fn from(v: Value) -> Self {
        AckReply::Single(v)
    }
}

impl From<Vec<Value>> for AckReply {
    fn from(values: Vec<Value>) -> Self {
        AckReply::Multi(values)
    }
}

type EventHandlerEntry = (EventHandler, bool);

/// The connect/event/ack state machine sitting on top of an [`Engine`]
/// (§4.3). One `Server` serves every namespace registered on it; namespace
/// fanout and room membership live one layer down, in [`Manager`].
pub struct Server<E: Engine> {
    engine: Arc<E>,
    manager: Manager,
    config: ServerConfig,
    connect_handlers: RwLock<HashMap<String, ConnectHandler>>,
    disconnect_handlers: RwLock<HashMap<String, DisconnectHandler>>,
    event_handlers: RwLock<HashMap<(String, String), EventHandlerEntry>>,
    environ: RwLock<HashMap<String, serde_json::Value>>,
    /// Binary packets mid-reassembly, keyed by sid. A sid only ever has one
    /// outstanding binary packet at a time: the wire protocol is a single
    /// logical connection, frames arrive in order.
    partial_binary: Mutex<HashMap<String, Packet>>,
    /// Namespaces each sid is connected to, in the order it connected to
    /// them (§4.3, "On eio_disconnect": the disconnect event must fire in
    /// connection order with the default namespace last — `Manager`'s room
    /// table doesn't preserve that order, so the server tracks it itself).
    namespace_order: Mutex<HashMap<String, Vec<String>>>,
}

impl<E: Engine> Server<E> {
    pub fn new(engine: Arc<E>, config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            manager: Manager::new(),
            config,
            connect_handlers: RwLock::new(HashMap::new()),
            disconnect_handlers: RwLock::new(HashMap::new()),
            event_handlers: RwLock::new(HashMap::new()),
            environ: RwLock::new(HashMap::new()),
            partial_binary: Mutex::new(HashMap::new()),
            namespace_order: Mutex::new(HashMap::new()),
        })
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn environ(&self, sid: &str) -> Option<serde_json::Value> {
        self.environ.read().unwrap().get(sid).cloned()
    }

    /// Register a namespace built with [`crate::NamespaceHandlerBuilder`].
    /// Fails if any of its event handlers' blocking mode contradicts
    /// `ServerConfig::async_handlers` (§4.5).
    pub fn register_namespace(&self, handler: NamespaceHandler) -> Result<(), Error> {
        for (event, (_, blocking)) in &handler.events {
            if *blocking && self.config.async_handlers {
                return Err(Error::RegistrationError(format!(
                    "{}#{event} is registered as blocking but async_handlers is enabled",
                    handler.path
                )));
            }
            if !*blocking && !self.config.async_handlers {
                return Err(Error::RegistrationError(format!(
                    "{}#{event} is registered as concurrent but async_handlers is disabled",
                    handler.path
                )));
            }
        }
        if let Some(connect) = handler.connect {
            self.connect_handlers.write().unwrap().insert(handler.path.clone(), connect);
        }
        if let Some(disconnect) = handler.disconnect {
            self.disconnect_handlers
                .write()
                .unwrap()
                .insert(handler.path.clone(), disconnect);
        }
        let mut events = self.event_handlers.write().unwrap();
        for (event, entry) in handler.events {
            events.insert((handler.path.clone(), event), entry);
        }
        Ok(())
    }

    /// Ad hoc registration outside of a [`NamespaceHandler`], always
    /// concurrent dispatch.
    pub fn on_event(&self, ns: impl Into<String>, event: impl Into<String>, handler: EventHandler) {
        self.event_handlers
            .write()
            .unwrap()
            .insert((ns.into(), event.into()), (handler, false));
    }

    /// Encode `packet` and hand its frames to the engine in order. Returns
    /// the first [`Error::Engine`] encountered (after still attempting every
    /// remaining frame, so a rejected attachment doesn't stop earlier ones
    /// from going out) so callers with a `Result`-returning contract
    /// (`emit`/`call`) can surface it; callers with no such contract log it
    /// here and move on, per §7's "must not die" propagation policy.
    async fn send_packet(&self, sid: &str, packet: &Packet) -> Result<(), Error> {
        let encoded = packet.encode();
        let mut first_err = None;
        for frame in Vec::<Frame>::from(encoded) {
            if let Err(err) = self.engine.send(sid, frame).await {
                tracing::error!(sid, error = %err, "engine rejected frame");
                first_err.get_or_insert(Error::Engine(err.reason));
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The connect-handler protocol shared by `eio_connect` (implicitly "/")
    /// and an explicit namespace `CONNECT` packet (§4.3).
    async fn run_connect_protocol(&self, sid: &str, ns: &str, payload: serde_json::Value) {
        let handler = self.connect_handlers.read().unwrap().get(ns).cloned();
        let outcome = match handler {
            Some(handler) => {
                match tokio::time::timeout(self.config.connect_timeout, handler(sid.to_string(), payload.clone())).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(sid, ns, "connect handler exceeded connect_timeout");
                        self.engine.disconnect(sid, true).await;
                        return;
                    }
                }
            }
            None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.manager.connect(sid, ns);
                self.environ.write().unwrap().insert(sid.to_string(), payload);
                let mut order = self.namespace_order.lock().unwrap();
                let entry = order.entry(sid.to_string()).or_default();
                if !entry.iter().any(|n| n == ns) {
                    entry.push(ns.to_string());
                }
                drop(order);
                match Packet::connect(ns, Value::Null) {
                    Ok(packet) => {
                        let _ = self.send_packet(sid, &packet).await;
                    }
                    Err(err) => tracing::error!(sid, ns, error = %err, "failed to build CONNECT packet"),
                }
            }
            Err(ConnectError::Rejected) => {
                tracing::debug!(sid, ns, "connect handler rejected connection");
                if self.config.always_connect {
                    if let Ok(packet) = Packet::connect(ns, Value::Null) {
                        let _ = self.send_packet(sid, &packet).await;
                    }
                    let _ = self.send_packet(sid, &Packet::disconnect(ns)).await;
                }
            }
            Err(ConnectError::Refused(payload)) => {
                tracing::debug!(sid, ns, "connect handler refused connection");
                let data = payload.map(Value::from).unwrap_or(Value::Null);
                let _ = self.send_packet(sid, &Packet::connect_error(ns, data)).await;
            }
        }
    }

    /// The transport layer has a new session (`eio_connect`, §4.3): always
    /// treated as a connect to `"/"`.
    #[tracing::instrument(skip(self, environ))]
    pub async fn handle_engine_connect(&self, sid: &str, environ: serde_json::Value) {
        tracing::debug!("engine session established");
        self.run_connect_protocol(sid, "/", environ).await;
    }

    /// One frame arrived from the transport for `sid` (§4.3, §4.1).
    pub async fn handle_engine_message(self: &Arc<Self>, sid: &str, frame: Frame) {
        match frame {
            Frame::Text(text) => {
                let packet = match Packet::decode(&text) {
                    Ok(packet) => packet,
                    Err(err) => {
                        tracing::error!(sid, error = %err, "failed to decode packet");
                        return;
                    }
                };
                if packet.r#type.is_binary() && !packet.is_complete() {
                    self.partial_binary.lock().unwrap().insert(sid.to_string(), packet);
                    return;
                }
                self.dispatch_packet(sid, packet).await;
            }
            Frame::Binary(bytes) => {
                let ready = {
                    let mut pending = self.partial_binary.lock().unwrap();
                    match pending.get_mut(sid) {
                        Some(packet) => match packet.add_attachment(bytes) {
                            Ok(true) => pending.remove(sid),
                            Ok(false) => None,
                            Err(err) => {
                                tracing::error!(sid, error = %err, "binary attachment rejected");
                                pending.remove(sid);
                                None
                            }
                        },
                        None => {
                            tracing::debug!(sid, "binary frame with no packet awaiting attachments");
                            None
                        }
                    }
                };
                if let Some(packet) = ready {
                    self.dispatch_packet(sid, packet).await;
                }
            }
        }
    }

    async fn dispatch_packet(self: &Arc<Self>, sid: &str, packet: Packet) {
        let ns = packet.namespace.clone();
        match packet.r#type {
            PacketType::Connect => {
                self.run_connect_protocol(sid, &ns, packet.data.into()).await;
            }
            PacketType::Disconnect => {
                if ns == "/" {
                    for ns in self.namespaces_for_sid(sid) {
                        self.disconnect_namespace(sid, &ns).await;
                    }
                } else {
                    self.disconnect_namespace(sid, &ns).await;
                }
            }
            PacketType::Event | PacketType::BinaryEvent => {
                self.handle_event_packet(sid, &ns, packet).await;
            }
            PacketType::Ack | PacketType::BinaryAck => {
                if let Some(id) = packet.id {
                    let args = match packet.data {
                        Value::Array(items) => items,
                        other => vec![other],
                    };
                    self.manager.trigger_callback(sid, &ns, id, args);
                }
            }
            PacketType::ConnectError => {
                tracing::debug!(sid, ns, "received ERROR packet from peer, ignoring");
            }
        }
    }

    async fn handle_event_packet(self: &Arc<Self>, sid: &str, ns: &str, packet: Packet) {
        let Value::Array(mut items) = packet.data else {
            tracing::error!(sid, ns, "EVENT payload was not an array");
            return;
        };
        if items.is_empty() {
            tracing::error!(sid, ns, "EVENT payload was an empty array");
            return;
        }
        let Value::String(event) = items.remove(0) else {
            tracing::error!(sid, ns, "EVENT payload's first element was not a string");
            return;
        };
        let args = items;

        let entry = self
            .event_handlers
            .read()
            .unwrap()
            .get(&(ns.to_string(), event.clone()))
            .cloned();
        let Some((handler, blocking)) = entry else {
            tracing::debug!(sid, ns, event, "no handler registered for event");
            return;
        };

        let id = packet.id;
        let server = Arc::clone(self);
        let sid = sid.to_string();
        let ns = ns.to_string();
        let run = async move {
            let reply = handler(sid.clone(), args).await;
            if let Some(id) = id {
                let data = Value::Array(reply.into_args());
                match Packet::ack(&ns, id, data) {
                    Ok(packet) => {
                        let _ = server.send_packet(&sid, &packet).await;
                    }
                    Err(err) => tracing::error!(sid, ns, error = %err, "failed to build ACK packet"),
                }
            }
        };

        if blocking {
            run.await;
        } else {
            self.engine.start_background_task(Box::pin(run));
        }
    }

    async fn disconnect_namespace(&self, sid: &str, ns: &str) {
        if let Some(handler) = self.disconnect_handlers.read().unwrap().get(ns).cloned() {
            handler(sid.to_string()).await;
        }
        self.manager.disconnect(sid, ns);
        if let Some(order) = self.namespace_order.lock().unwrap().get_mut(sid) {
            order.retain(|n| n != ns);
        }
    }

    /// Namespaces `sid` is presently connected to, in the order it connected
    /// to them, default namespace moved last (§4.3, "On eio_disconnect").
    fn namespaces_for_sid(&self, sid: &str) -> Vec<String> {
        let mut namespaces = self.namespace_order.lock().unwrap().get(sid).cloned().unwrap_or_default();
        if let Some(pos) = namespaces.iter().position(|ns| ns == "/") {
            let root = namespaces.remove(pos);
            namespaces.push(root);
        }
        namespaces
    }

    /// The transport session for `sid` is gone (`eio_disconnect`, §4.3):
    /// fire a disconnect event on every namespace it was connected to,
    /// default namespace last, then forget it entirely.
    pub async fn handle_engine_disconnect(&self, sid: &str) {
        for ns in self.namespaces_for_sid(sid) {
            self.disconnect_namespace(sid, &ns).await;
        }
        self.environ.write().unwrap().remove(sid);
        self.partial_binary.lock().unwrap().remove(sid);
        self.namespace_order.lock().unwrap().remove(sid);
    }

    /// Application-initiated disconnect of `sid` from `ns` (§4.3). Leaving
    /// `"/"` tears down the whole transport session.
    pub async fn disconnect(&self, sid: &str, ns: &str) {
        let _ = self.send_packet(sid, &Packet::disconnect(ns)).await;
        self.manager.disconnect(sid, ns);
        if ns == "/" {
            self.engine.disconnect(sid, true).await;
        }
    }

    /// Fire-and-forget emit, optionally scoped to a room (§4.2).
    pub async fn emit(
        &self,
        event: &str,
        data: Vec<Value>,
        ns: &str,
        room: Option<&str>,
        skip_sid: &[String],
    ) -> Result<(), Error> {
        self.manager.emit(self, event, data, ns, room, skip_sid, None).await
    }

    /// Emit to a single sid's personal room and await its ack (§4.3,
    /// §7.4). Requires `ServerConfig::async_handlers`.
    pub async fn call(
        &self,
        event: &str,
        data: Vec<Value>,
        sid: Option<&str>,
        ns: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Value>, Error> {
        if !self.config.async_handlers {
            return Err(Error::CallRequiresAsyncHandlers);
        }
        let Some(sid) = sid else {
            return Err(Error::BroadcastCallNotSupported);
        };

        let notify = self.engine.create_event();
        let result: Arc<Mutex<Option<Vec<Value>>>> = Arc::new(Mutex::new(None));
        let result_slot = Arc::clone(&result);
        let notify_slot = Arc::clone(&notify);
        let callback: AckCallback = Box::new(move |args| {
            *result_slot.lock().unwrap() = Some(args);
            notify_slot.notify_one();
        });

        self.manager
            .emit(self, event, data, ns, Some(sid), &[], Some(callback))
            .await?;

        let timeout = timeout.unwrap_or(self.config.call_timeout);
        match tokio::time::timeout(timeout, notify.notified()).await {
            Ok(()) => Ok(result.lock().unwrap().take().unwrap_or_default()),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl<E: Engine> EmitSink for Server<E> {
    async fn emit_internal(
        &self,
        sid: &str,
        event: &str,
        data: Vec<Value>,
        namespace: &str,
        id: Option<u64>,
    ) -> Result<(), Error> {
        let mut items = vec![Value::String(event.to_string())];
        items.extend(data);
        let packet = Packet::event(namespace, id, Value::Array(items)).map_err(|err| {
            tracing::error!(sid, namespace, error = %err, "failed to build EVENT packet");
            Error::Protocol(err)
        })?;
        self.send_packet(sid, &packet).await
    }
}
