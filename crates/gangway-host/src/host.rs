use std::sync::Arc;

use gangway_core::{Fd, OpenFlags};

use crate::file::HostFile;

/// The host I/O capability consumed by host-brokered streams.
///
/// The mutating operations (`open`, `open_socket`, `read`, `write`,
/// `close`) are invoked only from the driver context; the host delivers
/// results by calling the completion methods on the target [`HostFile`]
/// (`on_open`, `on_read`, `on_write_ack`, `on_read_ready`, `on_close`),
/// also from the driver context.
///
/// `write_window` and `terminal_size` are synchronous queries over
/// host-cached values and may be called from any thread, including under
/// the coordinator lock.
pub trait HostIo: Send + Sync {
    /// Open the named resource for the given descriptor. Completion
    /// arrives via `target.on_open`.
    fn open(&self, fd: Fd, path: &str, flags: OpenFlags, target: Arc<HostFile>);

    /// Establish an outbound connection for the given descriptor.
    /// Completion arrives via `target.on_open` (never a terminal).
    fn open_socket(&self, fd: Fd, host: &str, port: u16, target: Arc<HostFile>);

    /// Ask the host for up to `count` more input bytes. Delivery arrives
    /// via `on_read`; zero or more deliveries may follow one request.
    fn read(&self, fd: Fd, count: usize);

    /// Hand a chunk of output to the host. Returns `false` if the host
    /// could not take the bytes at all; the stream treats that as a
    /// terminal failure.
    ///
    /// Called with the coordinator lock held; implementations must not
    /// call back into the stream directly (schedule instead).
    fn write(&self, fd: Fd, data: &[u8]) -> bool;

    /// Release the host resource. Completion arrives via `on_close`.
    fn close(&self, fd: Fd);

    /// Host-advertised byte budget for unacknowledged in-flight output.
    fn write_window(&self) -> usize;

    /// Current terminal size as `(cols, rows)`, if the host has one.
    fn terminal_size(&self) -> Option<(u16, u16)>;
}
