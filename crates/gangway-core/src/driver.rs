use std::cell::Cell;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

type Callback = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static ON_DRIVER: Cell<bool> = const { Cell::new(false) };
}

/// The single cooperative driver context: a dedicated OS thread that drains
/// scheduled callbacks strictly in arrival order.
///
/// Callbacks run serially, never concurrently with each other, and must
/// never block: they are limited to O(1) buffer and scheduling work plus
/// host I/O submissions. Calling threads block on the coordinator instead.
///
/// The thread exits once every [`DriverHandle`] clone has been dropped and
/// the queue has drained.
pub struct Driver {
    thread: JoinHandle<()>,
}

impl Driver {
    /// Start the driver thread and return it with a handle for scheduling.
    pub fn spawn() -> (Self, DriverHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Callback>();
        let thread = std::thread::Builder::new()
            .name("gangway-driver".to_string())
            .spawn(move || {
                ON_DRIVER.with(|flag| flag.set(true));
                while let Some(callback) = rx.blocking_recv() {
                    callback();
                }
            })
            .expect("failed to spawn driver thread");
        (Self { thread }, DriverHandle { tx })
    }

    /// Wait for the driver thread to exit. Returns once every handle has
    /// been dropped and the remaining callbacks have run.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Cloneable handle for scheduling callbacks onto the driver context.
#[derive(Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<Callback>,
}

impl DriverHandle {
    /// Queue a callback for execution on the driver thread. Callbacks run
    /// in the order they were scheduled.
    pub fn schedule<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(callback)).is_err() {
            log::warn!("driver gone, dropping scheduled callback");
        }
    }

    /// Whether the current thread is the driver thread. Used to run an
    /// immediate flush in place instead of a schedule round trip.
    pub fn on_driver_thread(&self) -> bool {
        ON_DRIVER.with(|flag| flag.get())
    }
}
