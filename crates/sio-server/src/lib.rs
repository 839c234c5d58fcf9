mod config;
mod engine;
mod error;
mod manager;
mod namespace_handler;
mod server;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use engine::{Engine, EngineError, Frame};
pub use error::Error;
pub use manager::{AckCallback, EmitSink, Manager};
pub use namespace_handler::{NamespaceHandler, NamespaceHandlerBuilder};
pub use server::{AckReply, ConnectError, ConnectHandler, DisconnectHandler, EventHandler, Server};

pub use sio_protocol::{Packet, PacketType, Value};
