use std::fmt;
use std::net::SocketAddr;

/// Transport-assigned identifier for one connection or listener.
pub type ConnId = u64;

/// Completion callback for an asynchronous transport operation. Always
/// dispatched on the driver context, never invoked inline from the
/// initiating call.
pub type Completion<T> = Box<dyn FnOnce(T) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The remote end refused the connection.
    Refused,
    /// The connection was reset or aborted mid-flight.
    Reset,
    /// The address could not be reached or bound.
    Unreachable,
    /// Any other transport-level failure.
    Failed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Refused => write!(f, "connection refused"),
            TransportError::Reset => write!(f, "connection reset"),
            TransportError::Unreachable => write!(f, "address unreachable"),
            TransportError::Failed => write!(f, "transport failure"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Raw asynchronous socket primitives consumed by the direct TCP streams.
///
/// All methods are invoked from the driver context and must not block;
/// each hands its result to the supplied completion, which the
/// implementation dispatches back on the driver context. At most one
/// read and one write are outstanding per connection, and at most one
/// accept per listener; implementations may rely on that.
pub trait Transport: Send + Sync {
    /// Open an outbound connection.
    fn connect(&self, host: &str, port: u16, done: Completion<Result<ConnId, TransportError>>);

    /// Ask for up to `max` inbound bytes. An empty buffer on success
    /// means the peer shut down cleanly.
    fn read(&self, conn: ConnId, max: usize, done: Completion<Result<Vec<u8>, TransportError>>);

    /// Transmit a chunk. Completes with the number of bytes actually
    /// taken, which may be less than `data.len()`.
    fn write(&self, conn: ConnId, data: Vec<u8>, done: Completion<Result<usize, TransportError>>);

    /// Bind and listen. Completes with the listener's identifier.
    fn listen(
        &self,
        addr: SocketAddr,
        backlog: u32,
        done: Completion<Result<ConnId, TransportError>>,
    );

    /// Wait for one inbound connection on a listener.
    fn accept(&self, listener: ConnId, done: Completion<Result<ConnId, TransportError>>);

    /// Release a connection or listener. Fire-and-forget.
    fn close(&self, conn: ConnId);
}
