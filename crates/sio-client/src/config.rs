use std::time::Duration;

/// Client-wide configuration (§4.4, §4.8 of the expanded spec).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whether a lost connection is retried automatically.
    pub reconnection: bool,
    /// `0` means retry forever.
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
    pub reconnection_delay_max: Duration,
    pub randomization_factor: f64,
    /// Whether byte-string leaves may be sent (some transports/browsers
    /// cannot carry binary attachments).
    pub binary: bool,
    /// Default timeout for `Client::call`.
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnection: true,
            reconnection_attempts: 0,
            reconnection_delay: Duration::from_secs(1),
            reconnection_delay_max: Duration::from_secs(5),
            randomization_factor: 0.5,
            binary: true,
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    inner: ClientConfigOverrides,
}

#[derive(Debug, Default)]
struct ClientConfigOverrides {
    reconnection: Option<bool>,
    reconnection_attempts: Option<u32>,
    reconnection_delay: Option<Duration>,
    reconnection_delay_max: Option<Duration>,
    randomization_factor: Option<f64>,
    binary: Option<bool>,
    call_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    pub fn reconnection(mut self, value: bool) -> Self {
        self.inner.reconnection = Some(value);
        self
    }

    pub fn reconnection_attempts(mut self, value: u32) -> Self {
        self.inner.reconnection_attempts = Some(value);
        self
    }

    pub fn reconnection_delay(mut self, value: Duration) -> Self {
        self.inner.reconnection_delay = Some(value);
        self
    }

    pub fn reconnection_delay_max(mut self, value: Duration) -> Self {
        self.inner.reconnection_delay_max = Some(value);
        self
    }

    pub fn randomization_factor(mut self, value: f64) -> Self {
        self.inner.randomization_factor = Some(value);
        self
    }

    pub fn binary(mut self, value: bool) -> Self {
        self.inner.binary = Some(value);
        self
    }

    pub fn call_timeout(mut self, value: Duration) -> Self {
        self.inner.call_timeout = Some(value);
        self
    }

    pub fn build(self) -> ClientConfig {
        let default = ClientConfig::default();
        ClientConfig {
            reconnection: self.inner.reconnection.unwrap_or(default.reconnection),
            reconnection_attempts: self.inner.reconnection_attempts.unwrap_or(default.reconnection_attempts),
            reconnection_delay: self.inner.reconnection_delay.unwrap_or(default.reconnection_delay),
            reconnection_delay_max: self.inner.reconnection_delay_max.unwrap_or(default.reconnection_delay_max),
            randomization_factor: self.inner.randomization_factor.unwrap_or(default.randomization_factor),
            binary: self.inner.binary.unwrap_or(default.binary),
            call_timeout: self.inner.call_timeout.unwrap_or(default.call_timeout),
        }
    }
}
