use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sio_server::{Engine, EngineError, Frame};
use tokio::sync::{mpsc, Notify};

struct Connection {
    outbound: mpsc::UnboundedSender<Frame>,
    session: Option<serde_json::Value>,
}

/// An [`Engine`] with no real transport behind it: `send` and `disconnect`
/// push onto per-session channels the harness wires to a paired
/// [`crate::MockClientEngine`] (or, for server-only tests, reads from
/// directly).
#[derive(Default)]
pub struct MockEngine {
    connections: Mutex<HashMap<String, Connection>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a session and returns the receiver the harness should drain
    /// — either into a paired client engine, or directly in a test that
    /// wants to assert on outbound frames.
    pub fn register(&self, sid: impl Into<String>) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .unwrap()
            .insert(sid.into(), Connection { outbound: tx, session: None });
        rx
    }

    pub fn is_registered(&self, sid: &str) -> bool {
        self.connections.lock().unwrap().contains_key(sid)
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn send(&self, sid: &str, frame: Frame) -> Result<(), EngineError> {
        let outbound = self.connections.lock().unwrap().get(sid).map(|c| c.outbound.clone());
        match outbound {
            Some(tx) => tx.send(frame).map_err(|_| EngineError {
                sid: sid.to_string(),
                reason: "peer channel closed".to_string(),
            }),
            None => Err(EngineError { sid: sid.to_string(), reason: "unknown session".to_string() }),
        }
    }

    async fn disconnect(&self, sid: &str, _abort: bool) {
        self.connections.lock().unwrap().remove(sid);
    }

    fn transport(&self, sid: &str) -> Option<String> {
        self.is_registered(sid).then(|| "websocket".to_string())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn start_background_task(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }

    fn create_event(&self) -> Arc<Notify> {
        Arc::new(Notify::new())
    }

    fn get_session(&self, sid: &str) -> Option<serde_json::Value> {
        self.connections.lock().unwrap().get(sid).and_then(|c| c.session.clone())
    }

    fn save_session(&self, sid: &str, value: serde_json::Value) {
        if let Some(conn) = self.connections.lock().unwrap().get_mut(sid) {
            conn.session = Some(value);
        }
    }
}
