use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Notify;

/// One frame as the underlying transport sees it: the codec's text frame,
/// or one of the raw binary attachment frames that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<sio_protocol::Encoded> for Vec<Frame> {
    fn from(encoded: sio_protocol::Encoded) -> Self {
        let mut frames = vec![Frame::Text(encoded.text)];
        frames.extend(encoded.attachments.into_iter().map(Frame::Binary));
        frames
    }
}

#[derive(Debug, thiserror::Error)]
#[error("engine rejected frame for {sid}: {reason}")]
pub struct EngineError {
    pub sid: String,
    pub reason: String,
}

/// The bidirectional transport engine the server state machine is built on
/// top of (§6, "Engine interface (consumed)"). Out of scope for this crate
/// to implement — long-polling/websocket framing, heartbeats and raw
/// message delivery live on the other side of this trait.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Enqueue one frame for delivery to `sid`.
    async fn send(&self, sid: &str, frame: Frame) -> Result<(), EngineError>;

    /// Terminate a session. `abort` mirrors the transport-level "no
    /// graceful drain" disconnect used by application-initiated disconnect.
    async fn disconnect(&self, sid: &str, abort: bool);

    /// Name of the underlying transport currently in use for `sid`.
    fn transport(&self, sid: &str) -> Option<String>;

    /// Cooperative sleep, used by the reconnect/backoff and timeout logic.
    async fn sleep(&self, duration: Duration);

    /// Start a task that runs independently of the caller (used for
    /// `async_handlers` dispatch and the connect-timeout watchdog).
    fn start_background_task(&self, fut: BoxFuture<'static, ()>);

    /// A one-shot wakeup primitive, used by `Server::call`'s wait loop.
    fn create_event(&self) -> Arc<Notify>;

    /// Per-session key-value store backing the Socket.IO `environ`/session.
    fn get_session(&self, sid: &str) -> Option<serde_json::Value>;
    fn save_session(&self, sid: &str, value: serde_json::Value);
}
