//! gangway-net: Direct TCP streams for the descriptor bridge.
//!
//! Unlike the host-brokered streams, these talk to raw asynchronous
//! transport primitives directly: a connection-oriented [`Transport`]
//! capability whose completions arrive on the driver context. The crate
//! provides the blocking connect/read/write bridge ([`TcpStream`]) and
//! the listening stream with single-slot accept backpressure
//! ([`TcpListener`]).

pub mod listener;
pub mod tcp;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use listener::TcpListener;
pub use tcp::TcpStream;
pub use transport::{Completion, ConnId, Transport, TransportError};
