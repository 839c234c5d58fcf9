use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sio_client::{Client, ClientConfig};
use sio_server::{Server, ServerConfig};
use tokio::sync::mpsc;

use crate::mock_client_engine::MockClientEngine;
use crate::mock_engine::MockEngine;

/// A server wired to zero or more mock client connections, none of them
/// sharing any real transport I/O (§4.9 of the expanded spec).
pub struct Harness {
    pub server: Arc<Server<MockEngine>>,
    pub engine: Arc<MockEngine>,
}

impl Harness {
    pub fn new(config: ServerConfig) -> Self {
        let engine = MockEngine::new();
        let server = Server::new(Arc::clone(&engine), config);
        Self { server, engine }
    }

    /// Brings up a new mock client engine connection under `sid`, running
    /// the engine-connect handshake on the server side, and returns a
    /// [`Client`] state machine wired to it. The returned client still needs
    /// `Client::connect` called to bring up namespaces.
    pub async fn add_client(&self, sid: impl Into<String>, config: ClientConfig) -> Client<MockClientEngine> {
        let sid = sid.into();
        let to_client_rx = self.engine.register(sid.clone());
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();

        self.server.handle_engine_connect(&sid, serde_json::Value::Null).await;

        let server = Arc::clone(&self.server);
        let pump_sid = sid.clone();
        tokio::spawn(async move {
            let mut rx = to_server_rx;
            while let Some(frame) = rx.recv().await {
                server.handle_engine_message(&pump_sid, frame).await;
            }
            server.handle_engine_disconnect(&pump_sid).await;
        });

        let engine = MockClientEngine::new(to_server_tx, to_client_rx);
        Client::new(engine, config)
    }
}

/// Polls `client.is_namespace_active(ns)` until it becomes true or `timeout`
/// elapses. The handshake and per-namespace `CONNECT` round trip both cross
/// spawned tasks, so there is no single future to simply `.await`.
pub async fn wait_for_namespace(client: &Client<MockClientEngine>, ns: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if client.is_namespace_active(ns) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    client.is_namespace_active(ns)
}

/// A single server + client pair, already past the engine-connect handshake
/// and the default namespace's `CONNECT` round trip.
pub async fn connected_pair() -> (Arc<Server<MockEngine>>, Client<MockClientEngine>) {
    connected_pair_with_config(ServerConfig::default(), ClientConfig::default()).await
}

pub async fn connected_pair_with_config(
    server_config: ServerConfig,
    client_config: ClientConfig,
) -> (Arc<Server<MockEngine>>, Client<MockClientEngine>) {
    let harness = Harness::new(server_config);
    let client = harness.add_client("1", client_config).await;
    client
        .connect("mock://test", HashMap::new(), vec!["websocket".to_string()], "/socket.io", Vec::new())
        .await
        .expect("mock client engine never rejects connect");
    (harness.server, client)
}
