use std::time::Duration;

/// Server-wide configuration (§4.8 of the expanded spec).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// When a connect handler rejects a connection, send `CONNECT` followed
    /// by `DISCONNECT` instead of just refusing outright, so the client can
    /// still observe the negotiated sid (§4.3 scenario 5).
    pub always_connect: bool,
    /// Run event handlers as concurrent tasks rather than inline. Required
    /// by `Server::call`.
    pub async_handlers: bool,
    /// How long an `eio_connect` session may go without completing the
    /// connect-handler protocol for `"/"` before the engine session is
    /// dropped.
    pub connect_timeout: Duration,
    /// Default timeout for `Server::call`.
    pub call_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            always_connect: false,
            async_handlers: true,
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    inner: ServerConfigOverrides,
}

#[derive(Debug, Default)]
struct ServerConfigOverrides {
    always_connect: Option<bool>,
    async_handlers: Option<bool>,
    connect_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
}

impl ServerConfigBuilder {
    pub fn always_connect(mut self, value: bool) -> Self {
        self.inner.always_connect = Some(value);
        self
    }

    pub fn async_handlers(mut self, value: bool) -> Self {
        self.inner.async_handlers = Some(value);
        self
    }

    pub fn connect_timeout(mut self, value: Duration) -> Self {
        self.inner.connect_timeout = Some(value);
        self
    }

    pub fn call_timeout(mut self, value: Duration) -> Self {
        self.inner.call_timeout = Some(value);
        self
    }

    pub fn build(self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig {
            always_connect: self.inner.always_connect.unwrap_or(default.always_connect),
            async_handlers: self.inner.async_handlers.unwrap_or(default.async_handlers),
            connect_timeout: self.inner.connect_timeout.unwrap_or(default.connect_timeout),
            call_timeout: self.inner.call_timeout.unwrap_or(default.call_timeout),
        }
    }
}
