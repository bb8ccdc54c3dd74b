use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use gangway_core::{
    Coordinator, DriverHandle, Errno, Fd, FcntlCmd, IoctlReq, OpenFlags, Stream, Winsize,
};

use crate::tcp::TcpStream;
use crate::transport::{ConnId, Transport, TransportError};

struct ListenerState {
    fd: Fd,
    flags: OpenFlags,
    listener: Option<ConnId>,
    listen_result: Option<Result<(), Errno>>,
    accept_inflight: bool,
    /// The single accepted-but-undrained connection. While occupied, no
    /// further transport accept is armed, so additional inbound
    /// connections queue up behind the transport.
    pending: Option<ConnId>,
    closed: bool,
}

/// Listening stream: `listen(backlog)` plus blocking `accept()`.
///
/// The transport delivers accepted connections one at a time into a
/// single pending slot; the listener re-arms only when `accept()` drains
/// the slot, giving single-slot backpressure on inbound connections.
pub struct TcpListener {
    coord: Arc<Coordinator>,
    driver: DriverHandle,
    transport: Arc<dyn Transport>,
    addr: SocketAddr,
    me: Weak<TcpListener>,
    state: Mutex<ListenerState>,
}

impl TcpListener {
    /// Create a listener bound to `addr`. Nothing touches the transport
    /// until [`TcpListener::listen`].
    pub fn bind(
        coord: Arc<Coordinator>,
        driver: DriverHandle,
        transport: Arc<dyn Transport>,
        fd: Fd,
        addr: SocketAddr,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            coord,
            driver,
            transport,
            addr,
            me: me.clone(),
            state: Mutex::new(ListenerState {
                fd,
                flags: OpenFlags::RDWR,
                listener: None,
                listen_result: None,
                accept_inflight: false,
                pending: None,
                closed: false,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start listening. Blocks the caller until the transport confirms
    /// the bind, then keeps one accept armed.
    pub fn listen(&self, backlog: u32) -> Result<(), Errno> {
        {
            let _guard = self.coord.lock();
            let mut st = self.state();
            if st.closed {
                return Err(Errno::Io);
            }
            if st.listener.is_some() {
                return Err(Errno::Inval);
            }
            st.listen_result = None;
        }
        let transport = self.transport.clone();
        let me = self.me.clone();
        let addr = self.addr;
        self.driver.schedule(move || {
            transport.listen(
                addr,
                backlog,
                Box::new(move |result| {
                    if let Some(listener) = me.upgrade() {
                        listener.on_listen_done(result);
                    }
                }),
            );
        });

        let mut guard = self.coord.lock();
        loop {
            let st = self.state();
            if let Some(result) = st.listen_result.clone() {
                drop(st);
                drop(guard);
                return result;
            }
            drop(st);
            guard = self.coord.wait(guard);
        }
    }

    /// Take the next inbound connection, registering it under `fd`.
    /// Blocks until one arrives; fails [`Errno::Again`] in non-blocking
    /// mode with the slot empty.
    pub fn accept(&self, fd: Fd) -> Result<Arc<TcpStream>, Errno> {
        let mut guard = self.coord.lock();
        let conn = loop {
            let mut st = self.state();
            if st.closed {
                return Err(Errno::Io);
            }
            if st.listener.is_none() {
                return Err(Errno::Inval);
            }
            if let Some(conn) = st.pending.take() {
                // Slot drained: re-arm for the next inbound connection.
                self.post_accept(&mut st);
                break conn;
            }
            if !st.flags.is_blocking() {
                return Err(Errno::Again);
            }
            drop(st);
            guard = self.coord.wait(guard);
        };
        drop(guard);
        Ok(TcpStream::adopt(
            self.coord.clone(),
            self.driver.clone(),
            self.transport.clone(),
            fd,
            conn,
        ))
    }

    fn post_accept(&self, st: &mut ListenerState) {
        if st.closed || st.accept_inflight || st.pending.is_some() {
            return;
        }
        let Some(listener) = st.listener else { return };
        st.accept_inflight = true;
        let transport = self.transport.clone();
        let me = self.me.clone();
        self.driver.schedule(move || {
            transport.accept(
                listener,
                Box::new(move |result| {
                    if let Some(listener) = me.upgrade() {
                        listener.on_accept_done(result);
                    }
                }),
            );
        });
    }

    fn on_listen_done(&self, result: Result<ConnId, TransportError>) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            match result {
                Ok(id) => {
                    st.listener = Some(id);
                    st.listen_result = Some(Ok(()));
                    self.post_accept(&mut st);
                }
                Err(err) => {
                    log::warn!("listen on {} failed: {err}", self.addr);
                    st.listen_result = Some(Err(Errno::Io));
                }
            }
        }
        self.coord.notify_all();
    }

    fn on_accept_done(&self, result: Result<ConnId, TransportError>) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            st.accept_inflight = false;
            match result {
                Ok(conn) => {
                    if st.closed {
                        // Raced with close; the orphan is ours to release.
                        self.transport.close(conn);
                    } else {
                        st.pending = Some(conn);
                    }
                }
                Err(err) => {
                    if !st.closed {
                        log::warn!("accept on {} failed: {err}", self.addr);
                    }
                }
            }
        }
        self.coord.notify_all();
    }
}

impl Stream for TcpListener {
    fn fd(&self) -> Fd {
        self.state().fd
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::NotSup)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::NotSup)
    }

    fn dup(&self, _fd: Fd) -> Result<Arc<dyn Stream>, Errno> {
        Err(Errno::NotSup)
    }

    fn close(&self) {
        let _guard = self.coord.lock();
        {
            let mut st = self.state();
            if st.closed {
                return;
            }
            st.closed = true;
            st.fd = -1;
            let transport = self.transport.clone();
            let listener = st.listener.take();
            let pending = st.pending.take();
            self.driver.schedule(move || {
                if let Some(conn) = pending {
                    transport.close(conn);
                }
                if let Some(id) = listener {
                    transport.close(id);
                }
            });
        }
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
        st.closed || st.pending.is_some()
    }

    fn is_write_ready(&self) -> bool {
        self.state().closed
    }

    fn is_exception(&self) -> bool {
        self.state().closed
    }
}
