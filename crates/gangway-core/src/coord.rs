use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::errno::Errno;
use crate::stream::{Fd, Stream};
use crate::table::FdTable;
use crate::termios::Termios;

/// The sole cross-context synchronization primitive: one mutex guarding the
/// descriptor table, and one condition variable shared by every stream.
///
/// Every field touched by both calling threads and the driver context is
/// mutated only while holding [`Coordinator::lock`]. The condition variable
/// is shared across unrelated streams, so every wait loop must re-check its
/// own predicate after waking; broadcast storms are the accepted trade-off
/// for having no cross-stream lock ordering at all.
///
/// The coordinator is an explicit object injected into every stream at
/// construction, shared via `Arc`, and torn down when the last stream drops.
pub struct Coordinator {
    table: Mutex<FdTable>,
    cond: Condvar,
    termios: Mutex<Termios>,
}

/// Guard returned by [`Coordinator::lock`]; carried through wait loops.
pub type CoordGuard<'a> = MutexGuard<'a, FdTable>;

impl Coordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(FdTable::new()),
            cond: Condvar::new(),
            termios: Mutex::new(Termios::default()),
        })
    }

    /// Acquire the shared lock. The guard doubles as access to the
    /// descriptor table.
    ///
    /// A poisoned lock is recovered rather than propagated: one panicking
    /// thread must not wedge every other stream in the process.
    pub fn lock(&self) -> CoordGuard<'_> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block on the shared condition variable, releasing the lock while
    /// suspended. Callers re-check their predicate on every wakeup.
    pub fn wait<'a>(&self, guard: CoordGuard<'a>) -> CoordGuard<'a> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every waiter. Cheap to call; waiters filter on their own
    /// predicates.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Snapshot of the shared terminal attributes.
    pub fn termios(&self) -> Termios {
        self.termios
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the shared terminal attributes.
    pub fn set_termios(&self, tio: Termios) {
        *self.termios.lock().unwrap_or_else(PoisonError::into_inner) = tio;
    }

    /// Duplicate a registered descriptor: allocates the lowest free
    /// descriptor and registers a stream sharing the same underlying
    /// resource.
    pub fn dup_fd(&self, fd: Fd) -> Result<Fd, Errno> {
        let mut table = self.lock();
        let stream = table.get(fd).ok_or(Errno::BadF)?;
        let new_fd = table.alloc_fd();
        let dup = stream.dup(new_fd)?;
        table.insert(new_fd, dup);
        Ok(new_fd)
    }

    /// Remove a descriptor from the table and close its stream.
    ///
    /// The stream is closed outside the table lock: close blocks on the
    /// driver handshake and must be able to re-acquire the lock.
    pub fn close_fd(&self, fd: Fd) -> Result<(), Errno> {
        let stream = {
            let mut table = self.lock();
            table.remove(fd).ok_or(Errno::BadF)?
        };
        stream.close();
        Ok(())
    }

    /// Register a stream under a freshly allocated descriptor. The
    /// constructor receives the descriptor being assigned.
    pub fn install<F>(&self, make: F) -> Fd
    where
        F: FnOnce(Fd) -> Arc<dyn Stream>,
    {
        let mut table = self.lock();
        let fd = table.alloc_fd();
        let stream = make(fd);
        table.insert(fd, stream);
        fd
    }
}
