//! gangway-host: Host-brokered streams for the descriptor bridge.
//!
//! The host (the far side of the driver context) actually performs the
//! I/O; this crate implements the blocking read/write protocol, the
//! flow-controlled write window, and the terminal line discipline on top
//! of the [`HostIo`] capability.

pub mod file;
pub mod host;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

pub use file::HostFile;
pub use host::HostIo;
pub use socket::HostSocket;
