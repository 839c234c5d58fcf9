use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sio_client::{ClientEngine, ClientEngineError, ClientTransportHandler, ConnectParams, Frame};
use tokio::sync::{mpsc, Notify};

use crate::frame::{to_client_frame, to_server_frame};

/// A [`ClientEngine`] wired to a paired [`crate::MockEngine`] connection by
/// plain mpsc channels carrying `sio_server::Frame` on the wire; see
/// [`crate::Harness::add_client`].
pub struct MockClientEngine {
    outbound: Mutex<Option<mpsc::UnboundedSender<sio_server::Frame>>>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<sio_server::Frame>>>,
}

impl MockClientEngine {
    pub fn new(
        outbound: mpsc::UnboundedSender<sio_server::Frame>,
        inbound: mpsc::UnboundedReceiver<sio_server::Frame>,
    ) -> Arc<Self> {
        Arc::new(Self {
            outbound: Mutex::new(Some(outbound)),
            inbound: Mutex::new(Some(inbound)),
        })
    }
}

#[async_trait]
impl ClientEngine for MockClientEngine {
    async fn connect(
        &self,
        _params: &ConnectParams,
        handler: Arc<dyn ClientTransportHandler>,
    ) -> Result<(), ClientEngineError> {
        let mut inbound = self
            .inbound
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ClientEngineError("mock client engine has no connection to open".to_string()))?;

        handler.on_open().await;
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                handler.on_message(to_client_frame(frame)).await;
            }
            handler.on_close(true).await;
        });
        Ok(())
    }

    async fn send(&self, frame: Frame) -> Result<(), ClientEngineError> {
        let sender = self.outbound.lock().unwrap().clone();
        match sender {
            Some(tx) => tx
                .send(to_server_frame(frame))
                .map_err(|_| ClientEngineError("server channel closed".to_string())),
            None => Err(ClientEngineError("not connected".to_string())),
        }
    }

    async fn disconnect(&self, _abort: bool) {
        self.outbound.lock().unwrap().take();
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
}
