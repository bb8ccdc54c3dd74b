use std::sync::Arc;

use bitflags::bitflags;

use crate::errno::Errno;
use crate::termios::{Termios, Winsize};

/// Descriptor number identifying a stream. `-1` is the invalid sentinel a
/// failed handshake leaves behind.
pub type Fd = i32;

/// Lowest descriptor not reserved for the stdio streams.
pub const FIRST_UNRESERVED_FD: Fd = 3;

bitflags! {
    /// Open flags carried by every stream. Only the blocking/non-blocking
    /// distinction affects behavior.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRONLY   = 0o1;
        const RDWR     = 0o2;
        const NONBLOCK = 0o4000;
    }
}

impl OpenFlags {
    /// Whether calls on this stream should block.
    pub fn is_blocking(&self) -> bool {
        !self.contains(OpenFlags::NONBLOCK)
    }
}

/// `fcntl` commands. Only the file-status-flag pair is supported; anything
/// else fails at the call site before reaching a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FcntlCmd {
    /// Get the file status flags.
    GetFl,
    /// Set the file status flags. Only the non-blocking bit is honored.
    SetFl(OpenFlags),
}

/// `ioctl` requests. Terminal window-size query is the only supported one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoctlReq {
    /// `TIOCGWINSZ`: query the terminal window size.
    WinSize,
}

/// Degenerate stat record: zeroed except for the identity fields, which
/// carry the descriptor number so callers see non-colliding identities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub size: u64,
}

impl Stat {
    /// Stat record for the given descriptor: everything zero except the
    /// identity fields.
    pub fn for_fd(fd: Fd) -> Self {
        Self {
            dev: fd as u64,
            ino: fd as u64,
            ..Self::default()
        }
    }
}

/// The capability stream contract: a uniform blocking read/write/control
/// interface over heterogeneous underlying resources.
///
/// Streams are shared as `Arc<dyn Stream>`; cloning the `Arc` is the
/// reference-counting story, and the resource is destroyed when the last
/// clone drops.
///
/// Lifecycle: `Created -> Opening -> Open -> Closing -> Closed`, where
/// `Opening` applies only to host-backed variants. `Closed` is terminal;
/// operations on a closed stream fail with [`Errno::Io`].
pub trait Stream: Send + Sync {
    /// Current descriptor number (`-1` after a failed handshake or close).
    fn fd(&self) -> Fd;

    /// Read up to `buf.len()` bytes.
    ///
    /// Returns more than zero bytes, or fails [`Errno::Again`] in
    /// non-blocking mode with nothing buffered, or [`Errno::Io`] on a
    /// closed stream. A blocking read suspends the caller until data
    /// arrives or the stream closes.
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno>;

    /// Queue the whole buffer for transmission and return immediately.
    /// Never partial; actual transmission is asynchronous.
    fn write(&self, buf: &[u8]) -> Result<usize, Errno>;

    /// New stream with its own descriptor sharing the same underlying host
    /// resource (capability sharing, not duplication).
    fn dup(&self, fd: Fd) -> Result<Arc<dyn Stream>, Errno>;

    /// Close the stream. Idempotent; host-backed variants block until the
    /// driver confirms release.
    fn close(&self);

    /// Get or set the file status flags. Setting honors only the
    /// non-blocking bit and returns the updated flags.
    fn fcntl(&self, cmd: FcntlCmd) -> Result<OpenFlags, Errno>;

    /// Terminal window-size query; fails on non-terminal streams.
    fn ioctl(&self, req: IoctlReq) -> Result<Winsize, Errno>;

    /// Whether this stream identifies as a terminal.
    fn isatty(&self) -> bool {
        false
    }

    /// Degenerate stat: zeroed record with the descriptor as identity.
    fn fstat(&self) -> Stat {
        Stat::for_fd(self.fd())
    }

    /// Terminal attributes, for terminal-identifying streams.
    fn tcgetattr(&self) -> Result<Termios, Errno> {
        Err(Errno::NotTty)
    }

    /// Replace the terminal attributes.
    fn tcsetattr(&self, _tio: &Termios) -> Result<(), Errno> {
        Err(Errno::NotTty)
    }

    /// True when a read would find data without blocking, or when the host
    /// has signalled that data is inbound.
    fn is_read_ready(&self) -> bool;

    /// True when queued plus in-flight output fits under the write window.
    fn is_write_ready(&self) -> bool;

    /// True when the stream is in an exceptional state (closed or failed).
    fn is_exception(&self) -> bool;
}
