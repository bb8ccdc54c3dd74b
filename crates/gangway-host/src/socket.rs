use std::sync::Arc;

use gangway_core::{
    Coordinator, DriverHandle, Errno, Fd, FcntlCmd, IoctlReq, OpenFlags, Stream, Winsize,
};

use crate::file::HostFile;
use crate::host::HostIo;

/// Host-brokered TCP connection: the relayed-socket variant of
/// [`HostFile`].
///
/// Shares the file stream's buffering, flow control, and close protocol,
/// but is never a terminal: no line discipline applies, terminal
/// operations are rejected, and read readiness reflects buffered bytes
/// only (the ready flag is a terminal-input signal).
pub struct HostSocket {
    file: Arc<HostFile>,
}

impl HostSocket {
    /// Connect to `hostname:port` through the host. Blocks the caller
    /// until the host reports the connection up or failed.
    pub fn connect(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        host: Arc<dyn HostIo>,
        fd: Fd,
        hostname: &str,
        port: u16,
    ) -> Result<Arc<Self>, Errno> {
        let file = HostFile::connect(coord, driver, host, fd, hostname, port)?;
        Ok(Arc::new(Self { file }))
    }
}

impl Stream for HostSocket {
    fn fd(&self) -> Fd {
        self.file.fd()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        self.file.read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        self.file.write(buf)
    }

    fn dup(&self, fd: Fd) -> Result<Arc<dyn Stream>, Errno> {
        self.file.dup(fd)
    }

    fn close(&self) {
        self.file.close();
    }

    fn fcntl(&self, cmd: FcntlCmd) -> Result<OpenFlags, Errno> {
        self.file.fcntl(cmd)
    }

    fn ioctl(&self, _req: IoctlReq) -> Result<Winsize, Errno> {
        Err(Errno::NotTty)
    }

    fn is_read_ready(&self) -> bool {
        self.file.has_buffered_input()
    }

    fn is_write_ready(&self) -> bool {
        self.file.is_write_ready()
    }

    fn is_exception(&self) -> bool {
        self.file.is_exception()
    }
}
