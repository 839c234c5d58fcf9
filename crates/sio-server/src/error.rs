use thiserror::Error;

/// Errors surfaced by the server state machine.
///
/// Structural errors (§7.1) propagate to the caller that fed the bad frame;
/// connect refusals (§7.2) are converted into an `ERROR` packet instead of
/// being returned to application code that isn't the connect handler.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] sio_protocol::Error),

    /// The underlying [`crate::Engine`] rejected a frame handed to it by
    /// [`crate::Server::emit`] or [`crate::Server::call`] (e.g. the sid's
    /// transport session is already gone).
    #[error("engine transport rejected a frame: {0}")]
    Engine(String),

    /// A connect handler raised the "connection-refused" sentinel, optionally
    /// carrying a JSON payload that is relayed to the peer in an `ERROR`
    /// packet (§7.2).
    #[error("connection refused")]
    ConnectRefused(Option<serde_json::Value>),

    /// `Server::call` did not receive an ack within its timeout (§7.4).
    #[error("ack not received within the call timeout")]
    Timeout,

    /// `Server::call` was invoked without a target sid (broadcast calls are
    /// not meaningful for a synchronous round trip, §4.3).
    #[error("call requires a single target sid, not a broadcast")]
    BroadcastCallNotSupported,

    /// `Server::call` requires `ServerConfig::async_handlers`.
    #[error("call() requires async_handlers to be enabled")]
    CallRequiresAsyncHandlers,

    /// An `emit` supplied both a room with more than one member and a
    /// callback; acks only make sense for single-recipient delivery (§4.2).
    #[error("an ack callback may only be used with single-recipient emit")]
    AckOnBroadcast,

    /// A [`crate::NamespaceHandler`] mixed blocking and non-blocking event
    /// handlers in a way that contradicts `ServerConfig::async_handlers`
    /// (§4.5, "mismatched concurrency model").
    #[error("{0}")]
    RegistrationError(String),
}
