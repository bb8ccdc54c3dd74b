/// POSIX-style error codes surfaced by stream operations.
///
/// Only the conditions the bridge actually produces are represented.
/// Transient conditions (`Again`) come back from the triggering call;
/// terminal stream failures surface as `Io` on every subsequent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Operation would block (`EAGAIN`): non-blocking read with no data.
    Again,
    /// I/O error (`EIO`): closed or failed stream.
    Io,
    /// Bad file descriptor (`EBADF`).
    BadF,
    /// Invalid argument or operation (`EINVAL`).
    Inval,
    /// Operation not supported on this stream (`ENOTSUP`).
    NotSup,
    /// Not a terminal (`ENOTTY`).
    NotTty,
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Errno::Again => write!(f, "resource temporarily unavailable"),
            Errno::Io => write!(f, "input/output error"),
            Errno::BadF => write!(f, "bad file descriptor"),
            Errno::Inval => write!(f, "invalid argument"),
            Errno::NotSup => write!(f, "operation not supported"),
            Errno::NotTty => write!(f, "not a terminal"),
        }
    }
}

impl std::error::Error for Errno {}
