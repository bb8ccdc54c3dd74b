use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use gangway_core::{
    Coordinator, DriverHandle, Errno, Fd, FcntlCmd, IoctlReq, OpenFlags, ProxyStream, Stream,
    Winsize,
};

use crate::transport::{ConnId, Transport, TransportError};

/// Per-direction transport chunk size, decoupling caller-requested sizes
/// from what one asynchronous transport call moves.
pub const SCRATCH_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Opening,
    Open,
    Closing,
    Closed,
}

struct SocketState {
    fd: Fd,
    flags: OpenFlags,
    phase: Phase,
    conn: Option<ConnId>,
    failed: bool,
    eof: bool,
    read_inflight: bool,
    write_inflight: bool,
    in_buf: VecDeque<u8>,
    out_buf: VecDeque<u8>,
}

/// Direct TCP connection over the raw [`Transport`] primitives.
///
/// A read pump keeps one transport read outstanding whenever the inbound
/// buffer has room; writes queue into the outbound buffer and drain one
/// scratch-sized chunk per transport call. At most one transport call is
/// in flight per direction.
pub struct TcpStream {
    coord: Arc<Coordinator>,
    driver: DriverHandle,
    transport: Arc<dyn Transport>,
    me: Weak<TcpStream>,
    state: Mutex<SocketState>,
}

impl TcpStream {
    /// Connect to `host:port`. Blocks the caller until the transport
    /// reports the connection up or failed.
    pub fn connect(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        transport: Arc<dyn Transport>,
        fd: Fd,
        host: &str,
        port: u16,
    ) -> Result<Arc<Self>, Errno> {
        let stream = Self::create(coord, driver.clone(), transport.clone(), fd, Phase::Opening, None);
        let me = stream.me.clone();
        let host = host.to_string();
        driver.schedule(move || {
            transport.connect(
                &host,
                port,
                Box::new(move |result| {
                    if let Some(stream) = me.upgrade() {
                        stream.on_connect(result);
                    }
                }),
            );
        });
        stream.wait_handshake()?;
        Ok(stream)
    }

    /// Wrap an already-established connection handed over by a listener
    /// and start its read pump.
    pub fn adopt(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        transport: Arc<dyn Transport>,
        fd: Fd,
        conn: ConnId,
    ) -> Arc<Self> {
        let stream = Self::create(coord, driver, transport, fd, Phase::Open, Some(conn));
        let guard = stream.coord.lock();
        stream.post_read(&mut stream.state());
        drop(guard);
        stream
    }

    fn create(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        transport: Arc<dyn Transport>,
        fd: Fd,
        phase: Phase,
        conn: Option<ConnId>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            coord,
            driver,
            transport,
            me: me.clone(),
            state: Mutex::new(SocketState {
                fd,
                flags: OpenFlags::RDWR,
                phase,
                conn,
                failed: false,
                eof: false,
                read_inflight: false,
                write_inflight: false,
                in_buf: VecDeque::new(),
                out_buf: VecDeque::new(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, SocketState> {
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

    /// Keep one transport read outstanding while the inbound buffer has
    /// room.
    fn post_read(&self, st: &mut SocketState) {
        if st.phase != Phase::Open || st.read_inflight || st.eof || st.failed {
            return;
        }
        let room = SCRATCH_SIZE.saturating_sub(st.in_buf.len());
        if room == 0 {
            return;
        }
        let Some(conn) = st.conn else { return };
        st.read_inflight = true;
        let transport = self.transport.clone();
        let me = self.me.clone();
        self.driver.schedule(move || {
            transport.read(
                conn,
                room,
                Box::new(move |result| {
                    if let Some(stream) = me.upgrade() {
                        stream.on_read_done(result);
                    }
                }),
            );
        });
    }

    /// Send the next scratch-sized chunk if none is in flight. The chunk
    /// stays queued until the transport confirms how much it took.
    fn post_write(&self, st: &mut SocketState) {
        if st.phase != Phase::Open || st.write_inflight || st.failed || st.out_buf.is_empty() {
            return;
        }
        let Some(conn) = st.conn else { return };
        let chunk: Vec<u8> = st.out_buf.iter().take(SCRATCH_SIZE).copied().collect();
        st.write_inflight = true;
        let transport = self.transport.clone();
        let me = self.me.clone();
        self.driver.schedule(move || {
            transport.write(
                conn,
                chunk,
                Box::new(move |result| {
                    if let Some(stream) = me.upgrade() {
                        stream.on_write_done(result);
                    }
                }),
            );
        });
    }

    fn on_connect(&self, result: Result<ConnId, TransportError>) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            match result {
                Ok(conn) => {
                    st.conn = Some(conn);
                    st.phase = Phase::Open;
                    self.post_read(&mut st);
                }
                Err(err) => {
                    log::warn!("tcp connect failed: {err}");
                    st.phase = Phase::Closed;
                    st.fd = -1;
                }
            }
        }
        self.coord.notify_all();
    }

    fn on_read_done(&self, result: Result<Vec<u8>, TransportError>) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            st.read_inflight = false;
            match result {
                Ok(data) if data.is_empty() => st.eof = true,
                Ok(data) => {
                    st.in_buf.extend(data);
                    self.post_read(&mut st);
                }
                Err(err) => {
                    if st.phase == Phase::Open {
                        log::warn!("tcp read failed: {err}");
                        st.failed = true;
                    }
                }
            }
        }
        self.coord.notify_all();
    }

    fn on_write_done(&self, result: Result<usize, TransportError>) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            st.write_inflight = false;
            match result {
                Ok(taken) => {
                    let taken = taken.min(st.out_buf.len());
                    st.out_buf.drain(..taken);
                    self.post_write(&mut st);
                }
                Err(err) => {
                    if st.phase == Phase::Open {
                        log::warn!("tcp write failed: {err}");
                        st.failed = true;
                    }
                }
            }
        }
        self.coord.notify_all();
    }

    fn on_closed(&self) {
        let _guard = self.coord.lock();
        self.state().phase = Phase::Closed;
        self.coord.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn queued_output(&self) -> usize {
        self.state().out_buf.len()
    }
}

impl Stream for TcpStream {
    fn fd(&self) -> Fd {
        self.state().fd
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut guard = self.coord.lock();
        let blocking = {
            let mut st = self.state();
            if st.failed || st.phase != Phase::Open {
                return Err(Errno::Io);
            }
            self.post_read(&mut st);
            st.flags.is_blocking()
        };
        if blocking {
            loop {
                let st = self.state();
                if !st.in_buf.is_empty() || st.eof || st.failed || st.phase != Phase::Open {
                    break;
                }
                drop(st);
                guard = self.coord.wait(guard);
            }
        }
        let mut st = self.state();
        let n = buf.len().min(st.in_buf.len());
        for (dst, src) in buf.iter_mut().zip(st.in_buf.drain(..n)) {
            *dst = src;
        }
        if n > 0 {
            // Draining made room; keep the pump running.
            self.post_read(&mut st);
            drop(st);
            drop(guard);
            return Ok(n);
        }
        let outcome = if st.failed || st.phase != Phase::Open {
            Err(Errno::Io)
        } else if st.eof {
            Ok(0)
        } else {
            Err(Errno::Again)
        };
        drop(st);
        drop(guard);
        outcome
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        let guard = self.coord.lock();
        let mut st = self.state();
        if st.failed || st.phase != Phase::Open {
            return Err(Errno::Io);
        }
        st.out_buf.extend(buf.iter().copied());
        self.post_write(&mut st);
        drop(st);
        drop(guard);
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
            st.phase = Phase::Closing;
            let conn = st.conn.take();
            let transport = self.transport.clone();
            let me = self.me.clone();
            self.driver.schedule(move || {
                if let Some(conn) = conn {
                    transport.close(conn);
                }
                if let Some(stream) = me.upgrade() {
                    stream.on_closed();
                }
            });
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
        self.coord.notify_all();
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

    fn ioctl(&self, _req: IoctlReq) -> Result<Winsize, Errno> {
        Err(Errno::NotTty)
    }

    fn is_read_ready(&self) -> bool {
        let st = self.state();
        st.phase != Phase::Open || !st.in_buf.is_empty() || st.eof || st.failed
    }

    fn is_write_ready(&self) -> bool {
        let st = self.state();
        st.phase != Phase::Open || st.out_buf.len() < SCRATCH_SIZE
    }

    fn is_exception(&self) -> bool {
        let st = self.state();
        st.failed || matches!(st.phase, Phase::Closing | Phase::Closed)
    }
}
