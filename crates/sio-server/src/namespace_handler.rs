use std::collections::HashMap;

use crate::server::{ConnectHandler, DisconnectHandler, EventHandler};

/// Groups event handlers under a namespace prefix (§4.5). This is purely a
/// registration-time convenience: rather than the reflective `on_<event>`
/// lookup the original system used, the handler table is built explicitly
/// here and handed to [`crate::Server::register_namespace`] — see the
/// "Dynamic dispatch" design note.
pub struct NamespaceHandler {
    pub(crate) path: String,
    pub(crate) connect: Option<ConnectHandler>,
    pub(crate) disconnect: Option<DisconnectHandler>,
    pub(crate) events: HashMap<String, (EventHandler, bool)>,
}

pub struct NamespaceHandlerBuilder {
    path: String,
    connect: Option<ConnectHandler>,
    disconnect: Option<DisconnectHandler>,
    events: HashMap<String, (EventHandler, bool)>,
}

impl NamespaceHandlerBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            connect: None,
            disconnect: None,
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

    /// Register a handler that runs as a concurrent task (the default
    /// dispatch mode, §5).
    pub fn on(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.events.insert(event.into(), (handler, false));
        self
    }

    /// Register a handler that must run inline on the dispatch thread.
    /// Mixing this with `ServerConfig::async_handlers = true` fails at
    /// registration time (§4.5, "mismatched concurrency model").
    pub fn on_blocking(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.events.insert(event.into(), (handler, true));
        self
    }

    pub fn build(self) -> NamespaceHandler {
        NamespaceHandler {
            path: self.path,
            connect: self.connect,
            disconnect: self.disconnect,
            events: self.events,
        }
    }
}
