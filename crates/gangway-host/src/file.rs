use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use gangway_core::stream::FIRST_UNRESERVED_FD;
use gangway_core::termios::{ControlChar, InputFlags, LocalFlags, OutputFlags};
use gangway_core::{
    CoordGuard, Coordinator, DriverHandle, Errno, Fd, FcntlCmd, IoctlReq, OpenFlags, ProxyStream,
    Stream, Termios, Winsize,
};

use crate::host::HostIo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Opening,
    Open,
    Closing,
    Closed,
}

struct FileState {
    fd: Fd,
    flags: OpenFlags,
    phase: Phase,
    atty: bool,
    read_ready: bool,
    failed: bool,
    flush_pending: bool,
    /// Bumped on every host delivery; the canonical-mode read loop uses it
    /// to detect that its one-byte request has been answered.
    deliveries: u64,
    in_buf: VecDeque<u8>,
    out_buf: VecDeque<u8>,
    sent: u64,
    acked: u64,
}

/// Host-brokered stream: the terminal/pipe bridge.
///
/// The calling thread enqueues and drains buffers and blocks on the
/// coordinator; the host performs the actual I/O and reports progress
/// through the `on_*` completion methods, which run on the driver context.
///
/// Output is flow-controlled by the host write window: bytes in flight
/// (`sent - acked`) plus the next chunk never exceed the window, and a
/// flush finding the window closed is deferred until an acknowledgement
/// reopens it.
pub struct HostFile {
    coord: Arc<Coordinator>,
    driver: DriverHandle,
    host: Arc<dyn HostIo>,
    me: Weak<HostFile>,
    state: Mutex<FileState>,
}

impl HostFile {
    /// Open a host-backed resource. Schedules the open on the driver and
    /// blocks the caller until the host confirms or rejects it.
    ///
    /// Streams start in blocking mode regardless of `flags`; non-blocking
    /// mode is entered through `fcntl(SETFL)`.
    pub fn open(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        host: Arc<dyn HostIo>,
        fd: Fd,
        path: &str,
        flags: OpenFlags,
    ) -> Result<Arc<Self>, Errno> {
        let stream = Self::create(coord, driver.clone(), host.clone(), fd, flags);
        let target = stream.clone();
        let path = path.to_string();
        let open_flags = flags - OpenFlags::NONBLOCK;
        driver.schedule(move || host.open(fd, &path, open_flags, target));
        stream.wait_handshake()?;
        Ok(stream)
    }

    /// Connect handshake used by the socket variant.
    pub(crate) fn connect(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        host: Arc<dyn HostIo>,
        fd: Fd,
        hostname: &str,
        port: u16,
    ) -> Result<Arc<Self>, Errno> {
        let stream = Self::create(coord, driver.clone(), host.clone(), fd, OpenFlags::RDWR);
        let target = stream.clone();
        let hostname = hostname.to_string();
        driver.schedule(move || host.open_socket(fd, &hostname, port, target));
        stream.wait_handshake()?;
        Ok(stream)
    }

    fn create(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        host: Arc<dyn HostIo>,
        fd: Fd,
        flags: OpenFlags,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            coord,
            driver,
            host,
            me: me.clone(),
            state: Mutex::new(FileState {
                fd,
                flags: flags - OpenFlags::NONBLOCK,
                phase: Phase::Opening,
                atty: false,
                read_ready: false,
                failed: false,
                flush_pending: false,
                deliveries: 0,
                in_buf: VecDeque::new(),
                out_buf: VecDeque::new(),
                sent: 0,
                acked: 0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_handshake(&self) -> Result<(), Errno> {
        let mut guard = self.coord.lock();
        loop {
            let st = self.state();
            if st.phase != Phase::Opening {
                break;
            }
            drop(st);
            guard = self.coord.wait(guard);
        }
        if self.state().fd < 0 {
            Err(Errno::Io)
        } else {
            Ok(())
        }
    }

    fn request_read(&self, fd: Fd, count: usize) {
        let host = self.host.clone();
        self.driver.schedule(move || host.read(fd, count));
    }

    /// Canonical mode: do not return until a full newline-terminated line
    /// is buffered. Requests one byte at a time and waits for each
    /// delivery, so an erase arriving late can still edit the line.
    fn wait_for_line<'a>(&self, mut guard: CoordGuard<'a>) -> CoordGuard<'a> {
        loop {
            {
                let st = self.state();
                if st.failed || st.phase != Phase::Open || st.in_buf.contains(&b'\n') {
                    return guard;
                }
            }
            loop {
                let st = self.state();
                if st.failed || st.phase != Phase::Open || st.read_ready {
                    break;
                }
                drop(st);
                guard = self.coord.wait(guard);
            }
            let (fd, seen) = {
                let st = self.state();
                if st.failed || st.phase != Phase::Open {
                    return guard;
                }
                (st.fd, st.deliveries)
            };
            self.request_read(fd, 1);
            loop {
                let st = self.state();
                if st.failed || st.phase != Phase::Open || st.deliveries != seen {
                    break;
                }
                drop(st);
                guard = self.coord.wait(guard);
            }
        }
    }

    fn append_output(st: &mut FileState, bytes: &[u8], translate_nl: bool) {
        if translate_nl {
            for &b in bytes {
                if b == b'\n' {
                    st.out_buf.push_back(b'\r');
                }
                st.out_buf.push_back(b);
            }
        } else {
            st.out_buf.extend(bytes);
        }
    }

    /// Echo path for arriving input; goes through the same output
    /// translation and flush machinery as a caller write.
    fn echo(&self, st: &mut FileState, bytes: &[u8], tio: &Termios) {
        let translate =
            tio.oflag.contains(OutputFlags::OPOST) && tio.oflag.contains(OutputFlags::ONLCR);
        Self::append_output(st, bytes, translate);
        self.post_flush(st, false);
    }

    /// Arm a flush if output is queued, none is pending, and the window
    /// has room. Off the driver context the flush is always scheduled;
    /// on it, an immediate flush runs in place unless `force_schedule`.
    fn post_flush(&self, st: &mut FileState, force_schedule: bool) {
        if st.flush_pending || st.failed || st.out_buf.is_empty() {
            return;
        }
        if (st.sent - st.acked) >= self.host.write_window() as u64 {
            return;
        }
        if force_schedule || !self.driver.on_driver_thread() {
            if let Some(me) = self.me.upgrade() {
                st.flush_pending = true;
                self.driver.schedule(move || me.flush());
            }
        } else {
            self.flush_locked(st);
        }
    }

    fn flush(self: Arc<Self>) {
        let _guard = self.coord.lock();
        let mut st = self.state();
        st.flush_pending = false;
        self.flush_locked(&mut st);
    }

    /// Transmit `min(acked + window - sent, queued)` bytes. A zero budget
    /// defers the flush (an acknowledgement re-arms it); a host refusal is
    /// a terminal stream failure.
    fn flush_locked(&self, st: &mut FileState) {
        if st.failed || st.phase == Phase::Closed {
            return;
        }
        let window = self.host.write_window() as u64;
        let budget = (st.acked + window).saturating_sub(st.sent) as usize;
        let count = budget.min(st.out_buf.len());
        if count == 0 {
            log::debug!(
                "fd {}: write window closed, {} bytes queued",
                st.fd,
                st.out_buf.len()
            );
            return;
        }
        let chunk: Vec<u8> = st.out_buf.iter().take(count).copied().collect();
        if self.host.write(st.fd, &chunk) {
            st.sent += count as u64;
            st.out_buf.drain(..count);
            self.coord.notify_all();
        } else {
            log::error!("fd {}: host write failed, failing the stream", st.fd);
            st.failed = true;
            self.coord.notify_all();
        }
    }

    /// Driver context: handshake result. On failure the descriptor becomes
    /// the invalid sentinel and the stream is closed.
    pub fn on_open(&self, success: bool, is_atty: bool) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            st.phase = if success { Phase::Open } else { Phase::Closed };
            st.atty = success && is_atty;
            if !success {
                st.fd = -1;
            }
        }
        self.coord.notify_all();
    }

    /// Driver context: input delivery. Terminal streams run the line
    /// discipline over each arriving byte; everything else is appended
    /// raw.
    pub fn on_read(&self, data: &[u8]) {
        let _guard = self.coord.lock();
        let mut st = self.state();
        if st.atty {
            let tio = self.coord.termios();
            let erase = tio.control_char(ControlChar::Erase);
            for &raw in data {
                let mut c = raw;
                if c == b'\r' {
                    if tio.iflag.contains(InputFlags::IGNCR) {
                        continue;
                    }
                    if tio.iflag.contains(InputFlags::ICRNL) {
                        c = b'\n';
                    }
                } else if c == b'\n' && tio.iflag.contains(InputFlags::INLCR) {
                    c = b'\r';
                }
                if tio.lflag.contains(LocalFlags::ICANON) {
                    if c == erase {
                        // Without ECHOE the erase char is consumed without
                        // editing; it never reaches the line buffer.
                        if tio.lflag.contains(LocalFlags::ECHOE)
                            && st.in_buf.back().is_some_and(|&last| last != b'\n')
                        {
                            // Remove the previous character on the line.
                            st.in_buf.pop_back();
                            if tio.lflag.contains(LocalFlags::ECHO) {
                                self.echo(&mut st, b"\x08 \x08", &tio);
                            }
                        }
                        continue;
                    }
                    if tio.lflag.contains(LocalFlags::ECHO)
                        || (tio.lflag.contains(LocalFlags::ECHONL) && c == b'\n')
                    {
                        self.echo(&mut st, &[c], &tio);
                    }
                } else if tio.lflag.contains(LocalFlags::ECHO) {
                    self.echo(&mut st, &[c], &tio);
                }
                st.in_buf.push_back(c);
            }
        } else {
            st.in_buf.extend(data);
        }
        st.deliveries += 1;
        drop(st);
        self.coord.notify_all();
    }

    /// Driver context: the host confirms `count` total bytes flushed
    /// end-to-end. An acknowledgement running backwards or ahead of `sent`
    /// is a protocol fault that fails the stream.
    pub fn on_write_ack(&self, count: u64) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            if count < st.acked || count > st.sent {
                log::error!(
                    "fd {}: acknowledgement {} outside [{}, {}], failing the stream",
                    st.fd,
                    count,
                    st.acked,
                    st.sent
                );
                st.failed = true;
            } else {
                st.acked = count;
                self.post_flush(&mut st, false);
            }
        }
        self.coord.notify_all();
    }

    /// Driver context: the host signals whether more input is inbound.
    pub fn on_read_ready(&self, ready: bool) {
        let _guard = self.coord.lock();
        self.state().read_ready = ready;
        self.coord.notify_all();
    }

    /// Driver context: the host confirms the resource is released.
    pub fn on_close(&self) {
        let _guard = self.coord.lock();
        self.state().phase = Phase::Closed;
        self.coord.notify_all();
    }

    pub(crate) fn has_buffered_input(&self) -> bool {
        !self.state().in_buf.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn input_snapshot(&self) -> Vec<u8> {
        self.state().in_buf.iter().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn counters(&self) -> (u64, u64) {
        let st = self.state();
        (st.sent, st.acked)
    }

    #[cfg(test)]
    pub(crate) fn queued_output(&self) -> usize {
        self.state().out_buf.len()
    }
}

impl Stream for HostFile {
    fn fd(&self) -> Fd {
        self.state().fd
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut guard = self.coord.lock();

        let blocking;
        {
            let st = self.state();
            if st.failed || st.phase != Phase::Open {
                return Err(Errno::Io);
            }
            blocking = st.flags.is_blocking();
            if st.in_buf.is_empty() {
                self.request_read(st.fd, buf.len());
            }
        }

        if blocking {
            loop {
                let st = self.state();
                if st.failed || st.phase != Phase::Open || !st.in_buf.is_empty() {
                    break;
                }
                drop(st);
                guard = self.coord.wait(guard);
            }
        } else {
            // A set readiness flag means data is expected shortly: wait for
            // it, but give up as soon as the flag drops (another reader may
            // have taken the delivery).
            loop {
                let st = self.state();
                if st.failed
                    || st.phase != Phase::Open
                    || !st.in_buf.is_empty()
                    || !st.read_ready
                {
                    break;
                }
                drop(st);
                guard = self.coord.wait(guard);
            }
        }

        let canonical =
            self.state().atty && self.coord.termios().lflag.contains(LocalFlags::ICANON);
        let guard = if canonical {
            self.wait_for_line(guard)
        } else {
            guard
        };

        let mut st = self.state();
        let n = buf.len().min(st.in_buf.len());
        for (slot, byte) in buf.iter_mut().zip(st.in_buf.drain(..n)) {
            *slot = byte;
        }
        if n == 0 {
            if st.failed || st.phase != Phase::Open {
                return Err(Errno::Io);
            }
            if !blocking {
                return Err(Errno::Again);
            }
        }
        drop(st);
        drop(guard);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        let _guard = self.coord.lock();
        let mut st = self.state();
        if st.failed || st.phase != Phase::Open {
            return Err(Errno::Io);
        }
        let translate = st.atty && {
            let tio = self.coord.termios();
            tio.oflag.contains(OutputFlags::OPOST) && tio.oflag.contains(OutputFlags::ONLCR)
        };
        Self::append_output(&mut st, buf, translate);
        self.post_flush(&mut st, true);
        Ok(buf.len())
    }

    fn dup(&self, fd: Fd) -> Result<Arc<dyn Stream>, Errno> {
        let me = self.me.upgrade().ok_or(Errno::BadF)?;
        Ok(ProxyStream::new(fd, me))
    }

    fn close(&self) {
        let mut guard = self.coord.lock();
        {
            let mut st = self.state();
            if st.phase != Phase::Open {
                return;
            }
            debug_assert!(st.fd >= FIRST_UNRESERVED_FD, "closing a reserved descriptor");
            st.phase = Phase::Closing;
            let host = self.host.clone();
            let fd = st.fd;
            self.driver.schedule(move || host.close(fd));
        }
        // Any in-flight flush was scheduled ahead of the close and runs
        // first; wait it out, then wait for the host confirmation.
        loop {
            let st = self.state();
            if !st.flush_pending {
                break;
            }
            drop(st);
            guard = self.coord.wait(guard);
        }
        loop {
            let st = self.state();
            if st.phase == Phase::Closed {
                break;
            }
            drop(st);
            guard = self.coord.wait(guard);
        }
        self.state().fd = -1;
    }

    fn fcntl(&self, cmd: FcntlCmd) -> Result<OpenFlags, Errno> {
        let mut st = self.state();
        match cmd {
            FcntlCmd::GetFl => Ok(st.flags),
            FcntlCmd::SetFl(new) => {
                st.flags
                    .set(OpenFlags::NONBLOCK, new.contains(OpenFlags::NONBLOCK));
                Ok(st.flags)
            }
        }
    }

    fn ioctl(&self, req: IoctlReq) -> Result<Winsize, Errno> {
        match req {
            IoctlReq::WinSize => self
                .host
                .terminal_size()
                .map(|(cols, rows)| Winsize {
                    rows,
                    cols,
                    xpixel: 0,
                    ypixel: 0,
                })
                .ok_or(Errno::Inval),
        }
    }

    fn isatty(&self) -> bool {
        self.state().atty
    }

    fn tcgetattr(&self) -> Result<Termios, Errno> {
        Ok(self.coord.termios())
    }

    fn tcsetattr(&self, tio: &Termios) -> Result<(), Errno> {
        self.coord.set_termios(tio.clone());
        Ok(())
    }

    fn is_read_ready(&self) -> bool {
        let st = self.state();
        st.read_ready || !st.in_buf.is_empty()
    }

    fn is_write_ready(&self) -> bool {
        let st = self.state();
        (st.sent - st.acked) + (st.out_buf.len() as u64) < (self.host.write_window() as u64)
    }

    fn is_exception(&self) -> bool {
        let st = self.state();
        st.failed || st.phase == Phase::Closed
    }
}
