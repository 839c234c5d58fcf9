use thiserror::Error;

/// Errors surfaced by the client state machine (§7, client-side subset).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] sio_protocol::Error),

    /// `Client::connect` failed because the transport layer refused the
    /// connection (§7.3).
    #[error("connection error: {0}")]
    Connection(String),

    /// `Client::call` did not receive an ack within its timeout (§7.4).
    #[error("ack not received within the call timeout")]
    Timeout,

    /// `Client::emit`/`call` targeted a namespace that is not currently
    /// active (§7.5) — either never requested, or dropped after a
    /// `connect_error`.
    #[error("namespace {0} is not active")]
    BadNamespace(String),

    /// `Client::emit`/`call` was given a payload containing a byte-string
    /// leaf while `ClientConfig::binary` is `false` (§4.4 "binary").
    #[error("ClientConfig::binary is false but the payload contains a binary leaf")]
    BinaryNotSupported,
}
