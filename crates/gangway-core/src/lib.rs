//! gangway-core: Coordination layer for the sync-over-async descriptor bridge.
//!
//! Provides the shared coordinator (one mutex + condition variable for every
//! stream), the serial driver context that executes scheduled callbacks, the
//! capability stream contract, the descriptor table, terminal attribute
//! types, and the null stream baseline.

pub mod coord;
pub mod driver;
pub mod errno;
pub mod null;
pub mod proxy;
pub mod stream;
pub mod table;
pub mod termios;

pub use coord::{CoordGuard, Coordinator};
pub use driver::{Driver, DriverHandle};
pub use errno::Errno;
pub use null::NullStream;
pub use proxy::ProxyStream;
pub use stream::{Fd, FcntlCmd, IoctlReq, OpenFlags, Stat, Stream};
pub use table::FdTable;
pub use termios::{ControlChar, InputFlags, LocalFlags, OutputFlags, Termios, Winsize};
