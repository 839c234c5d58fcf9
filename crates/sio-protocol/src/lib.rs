//! The Socket.IO v4 wire-format packet codec.
//!
//! This crate is pure and stateless: it knows how to turn a [`Packet`] into
//! wire frames and back, including binary-attachment splitting and
//! reassembly. It has no opinion about namespaces, rooms, transports, or
//! concurrency — those live in `sio-server` and `sio-client`.

mod error;
mod packet;
mod value;

pub use error::Error;
pub use packet::{Encoded, Packet, PacketType};
pub use value::Value;
