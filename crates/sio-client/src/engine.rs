use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Notify;

/// One frame as the underlying transport sees it, mirroring `sio_server`'s
/// `Frame` (kept as a separate type since this crate has no dependency on
/// `sio-server`).
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

#[derive(Debug, Clone, thiserror::Error)]
#[error("client engine connection error: {0}")]
pub struct ClientEngineError(pub String);

/// Parameters a `connect()` call needs to remember so the reconnect
/// supervisor can replay them unchanged (§4.4 "previous url/headers/...").
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub transports: Vec<String>,
    pub engine_path: String,
}

/// Callbacks the transport engine fires into the client state machine (§6,
/// the inverse direction of [`ClientEngine`]).
#[async_trait]
pub trait ClientTransportHandler: Send + Sync + 'static {
    async fn on_open(&self);
    async fn on_message(&self, frame: Frame);
    /// `unexpected` distinguishes a transport-initiated drop (triggers the
    /// reconnect supervisor, §4.4) from one the application itself asked for.
    async fn on_close(&self, unexpected: bool);
}

/// The transport engine the client state machine is built on top of (§6,
/// client side). Out of scope for this crate to implement.
#[async_trait]
pub trait ClientEngine: Send + Sync + 'static {
    async fn connect(
        &self,
        params: &ConnectParams,
        handler: Arc<dyn ClientTransportHandler>,
    ) -> Result<(), ClientEngineError>;

    async fn send(&self, frame: Frame) -> Result<(), ClientEngineError>;

    /// Tear down the current transport session. `abort` mirrors the
    /// "no graceful drain" application-initiated disconnect (§5).
    async fn disconnect(&self, abort: bool);

    async fn sleep(&self, duration: Duration);

    fn start_background_task(&self, fut: BoxFuture<'static, ()>);

    fn create_event(&self) -> Arc<Notify>;
}
