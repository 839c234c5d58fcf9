use std::collections::HashMap;

use crate::client::{ConnectErrorHandler, ConnectHandler, DisconnectHandler, EventHandler};

/// Groups a client's handlers for one namespace under a single object
/// (§4.5), the client-side counterpart of `sio_server::NamespaceHandler`.
/// The client always runs in single-threaded-cooperative mode (§5), so
/// there is no blocking/async registration split to enforce here — every
/// handler is a cooperative task.
pub struct ClientNamespaceHandler {
    pub(crate) path: String,
    pub(crate) connect: Option<ConnectHandler>,
    pub(crate) disconnect: Option<DisconnectHandler>,
    pub(crate) connect_error: Option<ConnectErrorHandler>,
    pub(crate) events: HashMap<String, EventHandler>,
}

pub struct ClientNamespaceHandlerBuilder {
    path: String,
    connect: Option<ConnectHandler>,
    disconnect: Option<DisconnectHandler>,
    connect_error: Option<ConnectErrorHandler>,
    events: HashMap<String, EventHandler>,
}

impl ClientNamespaceHandlerBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            connect: None,
            disconnect: None,
            connect_error: None,
            events: HashMap::new(),
        }
    }

    pub fn on_connect(mut self, handler: ConnectHandler) -> Self {
        self.connect = Some(handler);
        self
    }

    pub fn on_disconnect(mut self, handler: DisconnectHandler) -> Self {
        self.disconnect = Some(handler);
        self
    }

    pub fn on_connect_error(mut self, handler: ConnectErrorHandler) -> Self {
        self.connect_error = Some(handler);
        self
    }

    pub fn on(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.events.insert(event.into(), handler);
        self
    }

    pub fn build(self) -> ClientNamespaceHandler {
        ClientNamespaceHandler {
            path: self.path,
            connect: self.connect,
            disconnect: self.disconnect,
            connect_error: self.connect_error,
            events: self.events,
        }
    }
}
