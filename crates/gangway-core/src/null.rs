use std::sync::{Arc, Mutex, PoisonError};

use crate::errno::Errno;
use crate::stream::{Fd, FcntlCmd, IoctlReq, OpenFlags, Stream};
use crate::termios::Winsize;

/// Trivial sink/source stream: reads are EOF, writes report the full count
/// consumed, and no driver interaction ever happens. Open succeeds
/// synchronously.
pub struct NullStream {
    fd: Fd,
    flags: Mutex<OpenFlags>,
}

impl NullStream {
    pub fn open(fd: Fd, flags: OpenFlags) -> Arc<Self> {
        Arc::new(Self {
            fd,
            flags: Mutex::new(flags),
        })
    }

    fn flags(&self) -> std::sync::MutexGuard<'_, OpenFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Stream for NullStream {
    fn fd(&self) -> Fd {
        self.fd
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize, Errno> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        Ok(buf.len())
    }

    fn dup(&self, fd: Fd) -> Result<Arc<dyn Stream>, Errno> {
        Ok(NullStream::open(fd, *self.flags()))
    }

    fn close(&self) {}

    fn fcntl(&self, cmd: FcntlCmd) -> Result<OpenFlags, Errno> {
        let mut flags = self.flags();
        match cmd {
            FcntlCmd::GetFl => Ok(*flags),
            FcntlCmd::SetFl(new) => {
                flags.set(OpenFlags::NONBLOCK, new.contains(OpenFlags::NONBLOCK));
                Ok(*flags)
            }
        }
    }

    fn ioctl(&self, _req: IoctlReq) -> Result<Winsize, Errno> {
        Err(Errno::NotTty)
    }

    fn is_read_ready(&self) -> bool {
        true
    }

    fn is_write_ready(&self) -> bool {
        true
    }

    fn is_exception(&self) -> bool {
        false
    }
}
