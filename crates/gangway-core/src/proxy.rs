use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errno::Errno;
use crate::stream::{Fd, FcntlCmd, IoctlReq, OpenFlags, Stat, Stream};
use crate::termios::{Termios, Winsize};

/// A duplicated descriptor: a second fd over the same underlying stream.
///
/// All I/O and attribute operations forward to the shared stream, so a
/// mode change through one descriptor is visible through the other.
/// Closing the proxy only retires this descriptor; the underlying
/// resource stays open until its own descriptor is closed.
pub struct ProxyStream {
    fd: Fd,
    inner: Arc<dyn Stream>,
    closed: AtomicBool,
}

impl ProxyStream {
    pub fn new(fd: Fd, inner: Arc<dyn Stream>) -> Arc<Self> {
        Arc::new(Self {
            fd,
            inner,
            closed: AtomicBool::new(false),
        })
    }

    fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Stream for ProxyStream {
    fn fd(&self) -> Fd {
        if self.closed() {
            -1
        } else {
            self.fd
        }
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        self.inner.read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        self.inner.write(buf)
    }

    fn dup(&self, fd: Fd) -> Result<Arc<dyn Stream>, Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        // Chain to the real stream, not through this proxy.
        Ok(ProxyStream::new(fd, self.inner.clone()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn fcntl(&self, cmd: FcntlCmd) -> Result<OpenFlags, Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        self.inner.fcntl(cmd)
    }

    fn ioctl(&self, req: IoctlReq) -> Result<Winsize, Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        self.inner.ioctl(req)
    }

    fn isatty(&self) -> bool {
        !self.closed() && self.inner.isatty()
    }

    fn fstat(&self) -> Stat {
        Stat::for_fd(self.fd())
    }

    fn tcgetattr(&self) -> Result<Termios, Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        self.inner.tcgetattr()
    }

    fn tcsetattr(&self, tio: &Termios) -> Result<(), Errno> {
        if self.closed() {
            return Err(Errno::Io);
        }
        self.inner.tcsetattr(tio)
    }

    fn is_read_ready(&self) -> bool {
        !self.closed() && self.inner.is_read_ready()
    }

    fn is_write_ready(&self) -> bool {
        !self.closed() && self.inner.is_write_ready()
    }

    fn is_exception(&self) -> bool {
        self.closed() || self.inner.is_exception()
    }
}
