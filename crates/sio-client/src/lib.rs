mod client;
mod config;
mod engine;
mod error;
mod namespace_handler;
mod reconnect;

pub use client::{AckReply, Client, ConnectErrorHandler, ConnectHandler, DisconnectHandler, EventHandler};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use engine::{ClientEngine, ClientEngineError, ClientTransportHandler, ConnectParams, Frame};
pub use error::Error;
pub use namespace_handler::{ClientNamespaceHandler, ClientNamespaceHandlerBuilder};
pub use reconnect::{FixedJitter, JitterSource, RandomJitter};

pub use sio_protocol::{Packet, PacketType, Value};
