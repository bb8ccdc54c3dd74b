//! Test fakes: an in-process host that plays the far side of the bridge.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use gangway_core::{Coordinator, Driver, DriverHandle, Fd, OpenFlags};

use crate::file::HostFile;
use crate::host::HostIo;

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

/// Coordinator, driver handle, and fake host wired together.
pub(crate) fn rig(window: usize) -> (Arc<Coordinator>, DriverHandle, Arc<FakeHost>) {
    let (driver, handle) = Driver::spawn();
    // Detach; the thread exits once the last handle clone drops.
    drop(driver);
    let coord = Coordinator::new();
    let host = FakeHost::new(handle.clone(), window);
    (coord, handle, host)
}

struct Inner {
    window: usize,
    atty: bool,
    open_ok: bool,
    auto_ack: bool,
    fail_writes: bool,
    /// Max bytes served per read request; lets tests force the
    /// byte-at-a-time canonical path.
    serve_limit: usize,
    pending_input: VecDeque<u8>,
    target: Option<Weak<HostFile>>,
    opens: Vec<(Fd, String, OpenFlags)>,
    connects: Vec<(Fd, String, u16)>,
    read_requests: Vec<(Fd, usize)>,
    writes: Vec<Vec<u8>>,
    closes: Vec<Fd>,
    received: u64,
}

/// Records every host call and completes handshakes inline on the driver
/// context. Input can be preloaded (served on read requests) or pushed
/// with [`FakeHost::deliver`]; acknowledgements are automatic unless
/// disabled.
pub(crate) struct FakeHost {
    driver: DriverHandle,
    inner: Mutex<Inner>,
}

impl FakeHost {
    pub(crate) fn new(driver: DriverHandle, window: usize) -> Arc<Self> {
        Arc::new(Self {
            driver,
            inner: Mutex::new(Inner {
                window,
                atty: false,
                open_ok: true,
                auto_ack: true,
                fail_writes: false,
                serve_limit: usize::MAX,
                pending_input: VecDeque::new(),
                target: None,
                opens: Vec::new(),
                connects: Vec::new(),
                read_requests: Vec::new(),
                writes: Vec::new(),
                closes: Vec::new(),
                received: 0,
            }),
        })
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_atty(&self, atty: bool) {
        self.inner().atty = atty;
    }

    pub(crate) fn set_open_ok(&self, ok: bool) {
        self.inner().open_ok = ok;
    }

    pub(crate) fn set_auto_ack(&self, auto: bool) {
        self.inner().auto_ack = auto;
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.inner().fail_writes = fail;
    }

    pub(crate) fn set_serve_limit(&self, limit: usize) {
        self.inner().serve_limit = limit;
    }

    pub(crate) fn preload_input(&self, data: &[u8]) {
        self.inner().pending_input.extend(data);
    }

    fn target(&self) -> Option<Arc<HostFile>> {
        self.inner().target.as_ref().and_then(Weak::upgrade)
    }

    /// Push input to the stream through the driver context.
    pub(crate) fn deliver(&self, data: &[u8]) {
        let target = self.target().expect("no stream opened");
        let data = data.to_vec();
        self.driver.schedule(move || target.on_read(&data));
    }

    /// Acknowledge `count` total bytes through the driver context.
    pub(crate) fn ack(&self, count: u64) {
        let target = self.target().expect("no stream opened");
        self.driver.schedule(move || target.on_write_ack(count));
    }

    /// Flip the stream's read-ready flag through the driver context.
    pub(crate) fn set_ready(&self, ready: bool) {
        let target = self.target().expect("no stream opened");
        self.driver.schedule(move || target.on_read_ready(ready));
    }

    /// Everything transmitted so far, concatenated.
    pub(crate) fn output(&self) -> Vec<u8> {
        self.inner().writes.iter().flatten().copied().collect()
    }

    /// Sizes of the individual transmitted chunks.
    pub(crate) fn chunks(&self) -> Vec<usize> {
        self.inner().writes.iter().map(Vec::len).collect()
    }

    pub(crate) fn opens(&self) -> Vec<(Fd, String, OpenFlags)> {
        self.inner().opens.clone()
    }

    pub(crate) fn connects(&self) -> Vec<(Fd, String, u16)> {
        self.inner().connects.clone()
    }

    pub(crate) fn read_requests(&self) -> Vec<(Fd, usize)> {
        self.inner().read_requests.clone()
    }

    pub(crate) fn closes(&self) -> Vec<Fd> {
        self.inner().closes.clone()
    }
}

impl HostIo for FakeHost {
    fn open(&self, fd: Fd, path: &str, flags: OpenFlags, target: Arc<HostFile>) {
        let (ok, atty) = {
            let mut inner = self.inner();
            inner.opens.push((fd, path.to_string(), flags));
            inner.target = Some(Arc::downgrade(&target));
            (inner.open_ok, inner.atty)
        };
        target.on_open(ok, atty);
    }

    fn open_socket(&self, fd: Fd, host: &str, port: u16, target: Arc<HostFile>) {
        let ok = {
            let mut inner = self.inner();
            inner.connects.push((fd, host.to_string(), port));
            inner.target = Some(Arc::downgrade(&target));
            inner.open_ok
        };
        target.on_open(ok, false);
    }

    fn read(&self, fd: Fd, count: usize) {
        let served: Vec<u8> = {
            let mut inner = self.inner();
            inner.read_requests.push((fd, count));
            let n = count.min(inner.serve_limit).min(inner.pending_input.len());
            inner.pending_input.drain(..n).collect()
        };
        if !served.is_empty() {
            if let Some(target) = self.target() {
                target.on_read(&served);
            }
        }
    }

    fn write(&self, _fd: Fd, data: &[u8]) -> bool {
        // Called with the coordinator lock held: completions must be
        // scheduled, never delivered inline.
        let ack = {
            let mut inner = self.inner();
            if inner.fail_writes {
                return false;
            }
            inner.writes.push(data.to_vec());
            inner.received += data.len() as u64;
            inner.auto_ack.then_some(inner.received)
        };
        if let Some(count) = ack {
            if let Some(target) = self.target() {
                self.driver.schedule(move || target.on_write_ack(count));
            }
        }
        true
    }

    fn close(&self, fd: Fd) {
        self.inner().closes.push(fd);
        if let Some(target) = self.target() {
            target.on_close();
        }
    }

    fn write_window(&self) -> usize {
        self.inner().window
    }

    fn terminal_size(&self) -> Option<(u16, u16)> {
        Some((80, 24))
    }
}
