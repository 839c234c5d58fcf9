use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sio_protocol::{Packet, PacketType, Value};
use tokio::sync::Notify;

use crate::engine::{ClientEngine, ClientTransportHandler, ConnectParams, Frame};
use crate::error::Error;
use crate::namespace_handler::ClientNamespaceHandler;
use crate::reconnect::{backoff_delay, JitterSource, RandomJitter};
use crate::ClientConfig;

/// A pending outgoing ack callback, invoked once with the args the peer
/// replied with (mirrors `sio_server::manager::AckCallback`).
type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

pub type ConnectHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub type DisconnectHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub type ConnectErrorHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;
pub type EventHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, AckReply> + Send + Sync>;

/// What an event handler hands back to be serialized into an `ACK` packet,
/// should the triggering `EVENT` have carried an id (§9, "Ack reply shape").
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// The connect/event/ack state machine the application drives (§4.4). Cheap
/// to clone — it's a thin handle around the shared [`ClientInner`].
pub struct Client<E: ClientEngine> {
    inner: Arc<ClientInner<E>>,
}

impl<E: ClientEngine> Clone for Client<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct ClientInner<E: ClientEngine> {
    engine: Arc<E>,
    config: ClientConfig,
    jitter: Box<dyn JitterSource>,
    state: Mutex<State>,
    connect_params: Mutex<Option<ConnectParams>>,
    /// The additional (non-`/`) namespaces the caller asked for, or derived
    /// from registered handlers (§4.4 "Track the caller-requested namespaces").
    requested_namespaces: Mutex<Vec<String>>,
    active_namespaces: RwLock<HashSet<String>>,
    namespace_ready: Mutex<HashMap<String, Arc<Notify>>>,
    connect_handlers: RwLock<HashMap<String, ConnectHandler>>,
    disconnect_handlers: RwLock<HashMap<String, DisconnectHandler>>,
    connect_error_handlers: RwLock<HashMap<String, ConnectErrorHandler>>,
    event_handlers: RwLock<HashMap<(String, String), EventHandler>>,
    ack_callbacks: Mutex<HashMap<(String, u64), AckCallback>>,
    next_ack_id: Mutex<HashMap<String, u64>>,
    partial_binary: Mutex<Option<Packet>>,
    reconnect_abort: Mutex<Option<Arc<Notify>>>,
    reconnect_generation: AtomicU64,
    closed: Mutex<bool>,
    done: Notify,
}

impl<E: ClientEngine> Client<E> {
    pub fn new(engine: Arc<E>, config: ClientConfig) -> Self {
        Self::with_jitter(engine, config, Box::new(RandomJitter))
    }

    /// Construct with an explicit jitter source, for deterministic reconnect
    /// tests (§8 scenario 4).
    pub fn with_jitter(engine: Arc<E>, config: ClientConfig, jitter: Box<dyn JitterSource>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                engine,
                config,
                jitter,
                state: Mutex::new(State::Disconnected),
                connect_params: Mutex::new(None),
                requested_namespaces: Mutex::new(Vec::new()),
                active_namespaces: RwLock::new(HashSet::new()),
                namespace_ready: Mutex::new(HashMap::new()),
                connect_handlers: RwLock::new(HashMap::new()),
                disconnect_handlers: RwLock::new(HashMap::new()),
                connect_error_handlers: RwLock::new(HashMap::new()),
                event_handlers: RwLock::new(HashMap::new()),
                ack_callbacks: Mutex::new(HashMap::new()),
                next_ack_id: Mutex::new(HashMap::new()),
                partial_binary: Mutex::new(None),
                reconnect_abort: Mutex::new(None),
                reconnect_generation: AtomicU64::new(0),
                closed: Mutex::new(false),
                done: Notify::new(),
            }),
        }
    }

    /// Register a namespace built with [`crate::ClientNamespaceHandlerBuilder`].
    pub fn register_namespace(&self, handler: ClientNamespaceHandler) {
        if let Some(connect) = handler.connect {
            self.inner.connect_handlers.write().unwrap().insert(handler.path.clone(), connect);
        }
        if let Some(disconnect) = handler.disconnect {
            self.inner
                .disconnect_handlers
                .write()
                .unwrap()
                .insert(handler.path.clone(), disconnect);
        }
        if let Some(connect_error) = handler.connect_error {
            self.inner
                .connect_error_handlers
                .write()
                .unwrap()
                .insert(handler.path.clone(), connect_error);
        }
        let mut events = self.inner.event_handlers.write().unwrap();
        for (event, entry) in handler.events {
            events.insert((handler.path.clone(), event), entry);
        }
    }

    pub fn on_event(&self, ns: impl Into<String>, event: impl Into<String>, handler: EventHandler) {
        self.inner
            .event_handlers
            .write()
            .unwrap()
            .insert((ns.into(), event.into()), handler);
    }

    pub fn is_namespace_active(&self, ns: &str) -> bool {
        self.inner.active_namespaces.read().unwrap().contains(ns)
    }

    /// Connect to `url` and bring up every namespace in `namespaces` (plus
    /// the default namespace, always connected per the v4 wire protocol).
    /// An empty `namespaces` list derives its members from namespaces with
    /// registered handlers other than `/` (§4.4).
    pub async fn connect(
        &self,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        transports: Vec<String>,
        engine_path: impl Into<String>,
        namespaces: Vec<String>,
    ) -> Result<(), Error> {
        let requested = self.inner.derive_namespaces(namespaces);
        *self.inner.requested_namespaces.lock().unwrap() = requested.clone();
        let params = ConnectParams {
            url: url.into(),
            headers,
            transports,
            engine_path: engine_path.into(),
        };
        self.inner.do_connect(params).await?;

        let mut namespaces = vec!["/".to_string()];
        namespaces.extend(requested);
        self.inner.wait_for_namespaces(&namespaces).await
    }

    /// Fire-and-forget emit to `ns` (§4.4). Fails if `ns` is not currently
    /// active (§7.5).
    pub async fn emit(&self, ns: &str, event: &str, data: Vec<Value>) -> Result<(), Error> {
        self.inner.emit(ns, event, data).await
    }

    /// Emit and wait for the peer's ack (§4.4, mirror of `Server::call`).
    pub async fn call(
        &self,
        ns: &str,
        event: &str,
        data: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Value>, Error> {
        self.inner.call(ns, event, data, timeout).await
    }

    /// Leave `ns`; leaving `/` tears down the whole client (§4.4, mirror of
    /// `Server::disconnect`).
    pub async fn disconnect_namespace(&self, ns: &str) {
        self.inner.disconnect_namespace(ns).await;
    }

    /// Application-initiated full disconnect: no reconnection follows.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }

    /// Blocks until the transport has exited and the reconnect supervisor
    /// (if any) has terminated (§4.4).
    pub async fn wait(&self) {
        self.inner.wait().await;
    }
}

impl<E: ClientEngine> ClientInner<E> {
    fn derive_namespaces(&self, requested: Vec<String>) -> Vec<String> {
        let mut namespaces = if requested.is_empty() {
            let handlers = self.event_handlers.read().unwrap();
            let connects = self.connect_handlers.read().unwrap();
            let mut derived: HashSet<String> = handlers.keys().map(|(ns, _)| ns.clone()).collect();
            derived.extend(connects.keys().cloned());
            derived.remove("/");
            derived.into_iter().collect::<Vec<_>>()
        } else {
            requested
        };
        if namespaces.len() > 1 {
            namespaces.retain(|ns| ns != "/");
        }
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Waits for each of `namespaces` to receive its `CONNECT` packet
    /// (§4.4, "wait for the server's CONNECT/ns before considering that
    /// namespace ready"). Uses the standard `Notify` check-then-await
    /// pattern so a `CONNECT` that lands before this call starts waiting is
    /// never missed.
    async fn wait_for_namespaces(&self, namespaces: &[String]) -> Result<(), Error> {
        for ns in namespaces {
            if self.is_namespace_active(ns) {
                continue;
            }
            let notify = self.namespace_ready.lock().unwrap().get(ns).cloned();
            let Some(notify) = notify else { continue };
            let notified = notify.notified();
            if self.is_namespace_active(ns) {
                continue;
            }
            if tokio::time::timeout(self.config.call_timeout, notified).await.is_err() {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    async fn do_connect(self: &Arc<Self>, params: ConnectParams) -> Result<(), Error> {
        *self.state.lock().unwrap() = State::Connecting;
        let handler: Arc<dyn ClientTransportHandler> = Arc::clone(self) as Arc<dyn ClientTransportHandler>;
        self.engine.connect(&params, handler).await.map_err(|e| Error::Connection(e.0))?;
        *self.connect_params.lock().unwrap() = Some(params);
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) {
        let encoded = packet.encode();
        for frame in Vec::<Frame>::from(encoded) {
            if let Err(err) = self.engine.send(frame).await {
                tracing::error!(error = %err, "client engine rejected frame");
            }
        }
    }

    fn is_namespace_active(&self, ns: &str) -> bool {
        self.active_namespaces.read().unwrap().contains(ns)
    }

    async fn emit(&self, ns: &str, event: &str, data: Vec<Value>) -> Result<(), Error> {
        if !self.is_namespace_active(ns) {
            return Err(Error::BadNamespace(ns.to_string()));
        }
        self.send_event(ns, event, data, None).await
    }

    async fn call(&self, ns: &str, event: &str, data: Vec<Value>, timeout: Option<Duration>) -> Result<Vec<Value>, Error> {
        if !self.is_namespace_active(ns) {
            return Err(Error::BadNamespace(ns.to_string()));
        }

        let notify = self.engine.create_event();
        let result: Arc<Mutex<Option<Vec<Value>>>> = Arc::new(Mutex::new(None));
        let result_slot = Arc::clone(&result);
        let notify_slot = Arc::clone(&notify);
        let callback: AckCallback = Box::new(move |args| {
            *result_slot.lock().unwrap() = Some(args);
            notify_slot.notify_one();
        });

        let id = self.generate_ack_id(ns, callback);
        self.send_event(ns, event, data, Some(id)).await?;

        let timeout = timeout.unwrap_or(self.config.call_timeout);
        match tokio::time::timeout(timeout, notify.notified()).await {
            Ok(()) => Ok(result.lock().unwrap().take().unwrap_or_default()),
            Err(_) => Err(Error::Timeout),
        }
    }

    fn generate_ack_id(&self, ns: &str, cb: AckCallback) -> u64 {
        let mut counters = self.next_ack_id.lock().unwrap();
        let counter = counters.entry(ns.to_string()).or_insert(0);
        *counter += 1;
        let id = *counter;
        self.ack_callbacks.lock().unwrap().insert((ns.to_string(), id), cb);
        id
    }

    async fn send_event(&self, ns: &str, event: &str, data: Vec<Value>, id: Option<u64>) -> Result<(), Error> {
        if !self.config.binary && data.iter().any(Value::contains_binary_leaf) {
            return Err(Error::BinaryNotSupported);
        }
        let mut items = vec![Value::String(event.to_string())];
        items.extend(data);
        let packet = Packet::event(ns, id, Value::Array(items))?;
        self.send_packet(&packet).await;
        Ok(())
    }

    async fn disconnect_namespace(self: &Arc<Self>, ns: &str) {
        self.send_packet(&Packet::disconnect(ns)).await;
        self.active_namespaces.write().unwrap().remove(ns);
        if ns == "/" {
            self.disconnect().await;
        }
    }

    async fn disconnect(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == State::Closed {
                return;
            }
            *state = State::Closed;
        }
        self.reconnect_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(abort) = self.reconnect_abort.lock().unwrap().take() {
            abort.notify_one();
        }
        self.send_packet(&Packet::disconnect("/")).await;
        self.engine.disconnect(true).await;
        self.mark_done();
    }

    fn mark_done(&self) {
        *self.closed.lock().unwrap() = true;
        self.done.notify_one();
    }

    async fn wait(&self) {
        loop {
            if *self.closed.lock().unwrap() {
                return;
            }
            self.done.notified().await;
        }
    }

    /// The reconnect supervisor (§4.4, §8 scenario 4): bounded-exponential
    /// backoff with jitter, replaying the last `connect()` parameters.
    fn spawn_reconnect_supervisor(self: &Arc<Self>) {
        let abort = Arc::new(Notify::new());
        *self.reconnect_abort.lock().unwrap() = Some(Arc::clone(&abort));
        let generation = self.reconnect_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(self);
        let fut: BoxFuture<'static, ()> = Box::pin(async move {
            let Some(params) = inner.connect_params.lock().unwrap().clone() else {
                inner.mark_done();
                return;
            };
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                let delay = backoff_delay(&inner.config, attempt, inner.jitter.as_ref());
                tokio::select! {
                    _ = abort.notified() => return,
                    _ = inner.engine.sleep(delay) => {}
                }
                if inner.reconnect_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                match inner.do_connect(params.clone()).await {
                    Ok(()) => {
                        *inner.reconnect_abort.lock().unwrap() = None;
                        return;
                    }
                    Err(err) => {
                        tracing::debug!(attempt, error = %err, "reconnect attempt failed");
                    }
                }
                let limit = inner.config.reconnection_attempts;
                if limit > 0 && attempt >= limit {
                    tracing::debug!("maximum reconnection attempts reached, giving up");
                    inner.mark_done();
                    return;
                }
            }
        });
        self.engine.start_background_task(fut);
    }
}

#[async_trait]
impl<E: ClientEngine> ClientTransportHandler for Arc<ClientInner<E>> {
    async fn on_open(&self) {
        *self.state.lock().unwrap() = State::Connected;
        let mut namespaces = vec!["/".to_string()];
        namespaces.extend(self.requested_namespaces.lock().unwrap().iter().cloned());
        namespaces.sort();
        namespaces.dedup();
        for ns in &namespaces {
            self.namespace_ready.lock().unwrap().insert(ns.clone(), Arc::new(Notify::new()));
        }
        // The default namespace auto-connects server-side on the transport
        // handshake alone (§4.3); only additional namespaces need an
        // explicit CONNECT.
        for ns in namespaces.iter().filter(|ns| ns.as_str() != "/") {
            if let Ok(packet) = Packet::connect(ns.as_str(), Value::Null) {
                self.send_packet(&packet).await;
            }
        }
    }

    async fn on_message(&self, frame: Frame) {
        let Frame::Text(text) = frame else {
            self.apply_binary_frame(frame).await;
            return;
        };
        let packet = match Packet::decode(&text) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::error!(error = %err, "failed to decode packet");
                return;
            }
        };
        if packet.r#type.is_binary() && !packet.is_complete() {
            *self.partial_binary.lock().unwrap() = Some(packet);
            return;
        }
        self.dispatch(packet).await;
    }

    async fn on_close(&self, unexpected: bool) {
        let was_connected = {
            let mut state = self.state.lock().unwrap();
            let was = *state == State::Connected;
            if *state != State::Closed {
                *state = State::Disconnected;
            }
            was
        };
        let namespaces: Vec<String> = self.active_namespaces.write().unwrap().drain().collect();
        for ns in namespaces {
            if let Some(handler) = self.disconnect_handlers.read().unwrap().get(&ns).cloned() {
                handler().await;
            }
        }

        if *self.closed.lock().unwrap() {
            return;
        }
        if unexpected && was_connected && self.config.reconnection {
            self.clone().spawn_reconnect_supervisor();
        } else {
            self.mark_done();
        }
    }
}

impl<E: ClientEngine> ClientInner<E> {
    async fn apply_binary_frame(&self, frame: Frame) {
        let Frame::Binary(bytes) = frame else { return };
        let ready = {
            let mut pending = self.partial_binary.lock().unwrap();
            match pending.as_mut() {
                Some(packet) => match packet.add_attachment(bytes) {
                    Ok(true) => pending.take(),
                    Ok(false) => None,
                    Err(err) => {
                        tracing::error!(error = %err, "binary attachment rejected");
                        pending.take();
                        None
                    }
                },
                None => {
                    tracing::debug!("binary frame with no packet awaiting attachments");
                    None
                }
            }
        };
        if let Some(packet) = ready {
            self.dispatch(packet).await;
        }
    }

    async fn dispatch(&self, packet: Packet) {
        let ns = packet.namespace.clone();
        match packet.r#type {
            PacketType::Connect => {
                self.active_namespaces.write().unwrap().insert(ns.clone());
                if let Some(notify) = self.namespace_ready.lock().unwrap().get(&ns).cloned() {
                    notify.notify_waiters();
                }
                if let Some(handler) = self.connect_handlers.read().unwrap().get(&ns).cloned() {
                    handler().await;
                }
            }
            PacketType::Disconnect => {
                self.active_namespaces.write().unwrap().remove(&ns);
                if let Some(handler) = self.disconnect_handlers.read().unwrap().get(&ns).cloned() {
                    handler().await;
                }
            }
            PacketType::Event | PacketType::BinaryEvent => {
                self.dispatch_event(&ns, packet).await;
            }
            PacketType::Ack | PacketType::BinaryAck => {
                if let Some(id) = packet.id {
                    let args = match packet.data {
                        Value::Array(items) => items,
                        other => vec![other],
                    };
                    let callback = self.ack_callbacks.lock().unwrap().remove(&(ns, id));
                    if let Some(callback) = callback {
                        callback(args);
                    }
                }
            }
            PacketType::ConnectError => {
                self.active_namespaces.write().unwrap().remove(&ns);
                if let Some(handler) = self.connect_error_handlers.read().unwrap().get(&ns).cloned() {
                    handler(packet.data).await;
                }
                if ns == "/" {
                    self.mark_done();
                }
            }
        }
    }

    async fn dispatch_event(&self, ns: &str, packet: Packet) {
        let Value::Array(mut items) = packet.data else {
            tracing::error!(ns, "EVENT payload was not an array");
            return;
        };
        if items.is_empty() {
            tracing::error!(ns, "EVENT payload was an empty array");
            return;
        }
        let Value::String(event) = items.remove(0) else {
            tracing::error!(ns, "EVENT payload's first element was not a string");
            return;
        };
        let args = items;

        let handler = self.event_handlers.read().unwrap().get(&(ns.to_string(), event.clone())).cloned();
        let Some(handler) = handler else {
            tracing::debug!(ns, event, "no handler registered for event");
            return;
        };

        let reply = handler(args).await;
        if let Some(id) = packet.id {
            let data = Value::Array(reply.into_args());
            match Packet::ack(ns, id, data) {
                Ok(ack_packet) => self.send_packet(&ack_packet).await,
                Err(err) => tracing::error!(ns, error = %err, "failed to build ACK packet"),
            }
        }
    }
}
