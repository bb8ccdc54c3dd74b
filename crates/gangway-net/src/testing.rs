//! Test fakes: an in-process transport that plays the far side of the
//! asynchronous socket primitives.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use gangway_core::{Coordinator, Driver, DriverHandle};

use crate::transport::{Completion, ConnId, Transport, TransportError};

/// Poll `cond` until it holds or a deadline passes.
pub(crate) fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Coordinator, driver handle, and fake transport wired together.
pub(crate) fn rig() -> (Arc<Coordinator>, DriverHandle, Arc<FakeTransport>) {
    let (driver, handle) = Driver::spawn();
    // Detach; the thread exits once the last handle clone drops.
    drop(driver);
    let coord = Coordinator::new();
    let transport = FakeTransport::new(handle.clone());
    (coord, handle, transport)
}

struct Conn {
    inbound: VecDeque<u8>,
    eof: bool,
    fail_reads: bool,
    written: Vec<u8>,
    chunks: Vec<usize>,
    read_maxes: Vec<usize>,
    /// Parked read call waiting for data, shutdown, or failure.
    reader: Option<(usize, Completion<Result<Vec<u8>, TransportError>>)>,
}

impl Conn {
    fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            eof: false,
            fail_reads: false,
            written: Vec::new(),
            chunks: Vec::new(),
            read_maxes: Vec::new(),
            reader: None,
        }
    }
}

struct Inner {
    next_id: ConnId,
    connect_ok: bool,
    listen_ok: bool,
    fail_writes: bool,
    /// Max bytes taken per write call; lets tests force partial writes.
    write_limit: usize,
    conns: HashMap<ConnId, Conn>,
    /// Inbound connections not yet handed to an accept call.
    backlog: VecDeque<ConnId>,
    /// Parked accept call waiting for an inbound connection.
    acceptor: Option<Completion<Result<ConnId, TransportError>>>,
    connects: Vec<(String, u16)>,
    listens: Vec<(SocketAddr, u32)>,
    conn_ids: Vec<ConnId>,
    accept_calls: usize,
    closes: Vec<ConnId>,
}

/// Records every transport call and dispatches completions on the driver
/// context. Reads park until [`FakeTransport::deliver`] or
/// [`FakeTransport::shutdown`] provides an answer; accepts park until
/// [`FakeTransport::inbound`] queues a connection.
pub(crate) struct FakeTransport {
    driver: DriverHandle,
    inner: Mutex<Inner>,
}

impl FakeTransport {
    pub(crate) fn new(driver: DriverHandle) -> Arc<Self> {
        Arc::new(Self {
            driver,
            inner: Mutex::new(Inner {
                next_id: 1,
                connect_ok: true,
                listen_ok: true,
                fail_writes: false,
                write_limit: usize::MAX,
                conns: HashMap::new(),
                backlog: VecDeque::new(),
                acceptor: None,
                connects: Vec::new(),
                listens: Vec::new(),
                conn_ids: Vec::new(),
                accept_calls: 0,
                closes: Vec::new(),
            }),
        })
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete<T: Send + 'static>(&self, done: Completion<T>, value: T) {
        self.driver.schedule(move || done(value));
    }

    fn alloc_conn(inner: &mut Inner) -> ConnId {
        let id = inner.next_id;
        inner.next_id += 1;
        inner.conns.insert(id, Conn::new());
        inner.conn_ids.push(id);
        id
    }

    /// Answer a parked read if the connection has something to say.
    fn serve_read(&self, inner: &mut Inner, conn: ConnId) {
        let Some(c) = inner.conns.get_mut(&conn) else { return };
        let Some((max, done)) = c.reader.take() else { return };
        if c.fail_reads {
            self.complete(done, Err(TransportError::Reset));
        } else if !c.inbound.is_empty() {
            let n = max.min(c.inbound.len());
            let data: Vec<u8> = c.inbound.drain(..n).collect();
            self.complete(done, Ok(data));
        } else if c.eof {
            self.complete(done, Ok(Vec::new()));
        } else {
            c.reader = Some((max, done));
        }
    }

    pub(crate) fn set_connect_ok(&self, ok: bool) {
        self.inner().connect_ok = ok;
    }

    pub(crate) fn set_listen_ok(&self, ok: bool) {
        self.inner().listen_ok = ok;
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.inner().fail_writes = fail;
    }

    pub(crate) fn set_write_limit(&self, limit: usize) {
        self.inner().write_limit = limit;
    }

    /// Push inbound bytes on a connection.
    pub(crate) fn deliver(&self, conn: ConnId, data: &[u8]) {
        let mut inner = self.inner();
        if let Some(c) = inner.conns.get_mut(&conn) {
            c.inbound.extend(data);
        }
        self.serve_read(&mut inner, conn);
    }

    /// Signal an orderly shutdown from the peer.
    pub(crate) fn shutdown(&self, conn: ConnId) {
        let mut inner = self.inner();
        if let Some(c) = inner.conns.get_mut(&conn) {
            c.eof = true;
        }
        self.serve_read(&mut inner, conn);
    }

    /// Make all reads on a connection fail from now on.
    pub(crate) fn fail_reads(&self, conn: ConnId) {
        let mut inner = self.inner();
        if let Some(c) = inner.conns.get_mut(&conn) {
            c.fail_reads = true;
        }
        self.serve_read(&mut inner, conn);
    }

    /// Present a new inbound connection to the listener.
    pub(crate) fn inbound(&self) -> ConnId {
        let mut inner = self.inner();
        let id = Self::alloc_conn(&mut inner);
        if let Some(done) = inner.acceptor.take() {
            self.complete(done, Ok(id));
        } else {
            inner.backlog.push_back(id);
        }
        id
    }

    pub(crate) fn written(&self, conn: ConnId) -> Vec<u8> {
        self.inner()
            .conns
            .get(&conn)
            .map(|c| c.written.clone())
            .unwrap_or_default()
    }

    pub(crate) fn chunks(&self, conn: ConnId) -> Vec<usize> {
        self.inner()
            .conns
            .get(&conn)
            .map(|c| c.chunks.clone())
            .unwrap_or_default()
    }

    pub(crate) fn read_maxes(&self, conn: ConnId) -> Vec<usize> {
        self.inner()
            .conns
            .get(&conn)
            .map(|c| c.read_maxes.clone())
            .unwrap_or_default()
    }

    pub(crate) fn connects(&self) -> Vec<(String, u16)> {
        self.inner().connects.clone()
    }

    pub(crate) fn listens(&self) -> Vec<(SocketAddr, u32)> {
        self.inner().listens.clone()
    }

    pub(crate) fn conn_ids(&self) -> Vec<ConnId> {
        self.inner().conn_ids.clone()
    }

    pub(crate) fn accept_calls(&self) -> usize {
        self.inner().accept_calls
    }

    pub(crate) fn closes(&self) -> Vec<ConnId> {
        self.inner().closes.clone()
    }
}

impl Transport for FakeTransport {
    fn connect(&self, host: &str, port: u16, done: Completion<Result<ConnId, TransportError>>) {
        let mut inner = self.inner();
        inner.connects.push((host.to_string(), port));
        if inner.connect_ok {
            let id = Self::alloc_conn(&mut inner);
            self.complete(done, Ok(id));
        } else {
            self.complete(done, Err(TransportError::Refused));
        }
    }

    fn read(&self, conn: ConnId, max: usize, done: Completion<Result<Vec<u8>, TransportError>>) {
        let mut inner = self.inner();
        match inner.conns.get_mut(&conn) {
            Some(c) => {
                c.read_maxes.push(max);
                c.reader = Some((max, done));
            }
            None => {
                self.complete(done, Err(TransportError::Failed));
                return;
            }
        }
        self.serve_read(&mut inner, conn);
    }

    fn write(&self, conn: ConnId, data: Vec<u8>, done: Completion<Result<usize, TransportError>>) {
        let mut inner = self.inner();
        if inner.fail_writes {
            self.complete(done, Err(TransportError::Reset));
            return;
        }
        let limit = inner.write_limit;
        match inner.conns.get_mut(&conn) {
            Some(c) => {
                let n = limit.min(data.len());
                c.written.extend_from_slice(&data[..n]);
                c.chunks.push(n);
                self.complete(done, Ok(n));
            }
            None => self.complete(done, Err(TransportError::Failed)),
        }
    }

    fn listen(
        &self,
        addr: SocketAddr,
        backlog: u32,
        done: Completion<Result<ConnId, TransportError>>,
    ) {
        let mut inner = self.inner();
        inner.listens.push((addr, backlog));
        if inner.listen_ok {
            let id = Self::alloc_conn(&mut inner);
            self.complete(done, Ok(id));
        } else {
            self.complete(done, Err(TransportError::Unreachable));
        }
    }

    fn accept(&self, _listener: ConnId, done: Completion<Result<ConnId, TransportError>>) {
        let mut inner = self.inner();
        inner.accept_calls += 1;
        if let Some(id) = inner.backlog.pop_front() {
            self.complete(done, Ok(id));
        } else {
            inner.acceptor = Some(done);
        }
    }

    fn close(&self, conn: ConnId) {
        self.inner().closes.push(conn);
    }
}
