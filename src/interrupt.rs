//! Per-thread interruption of blocking waits.
//!
//! Every thread carries an interrupted flag. Another thread holding that
//! thread's [`Interrupter`] can set the flag; if the target is blocked in a
//! crate wait (such as `TaskHandle::get`) it wakes up, and the wait reports
//! the interruption instead of the result.
//!
//! ```
//! use std::thread;
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! let worker = thread::spawn(move || {
//!     tx.send(bginit::interrupt::current()).unwrap();
//!     while !bginit::interrupt::is_interrupted() {
//!         thread::yield_now();
//!     }
//! });
//!
//! rx.recv().unwrap().interrupt();
//! worker.join().unwrap();
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

type Waker = Arc<dyn Fn() + Send + Sync>;

struct InterruptState {
    flag: AtomicBool,
    // wakes the wait the thread is currently blocked in, if any
    blocker: Mutex<Option<Waker>>,
}

thread_local! {
    static CURRENT: Arc<InterruptState> = Arc::new(InterruptState {
        flag: AtomicBool::new(false),
        blocker: Mutex::new(None),
    });
}

fn current_state() -> Arc<InterruptState> {
    CURRENT.with(Arc::clone)
}

/// Handle for interrupting one particular thread.
#[derive(Clone)]
pub struct Interrupter {
    state: Arc<InterruptState>,
    thread: Thread,
}

impl Interrupter {
    /// Set the thread's interrupted flag and wake it if it is blocked.
    pub fn interrupt(&self) {
        self.state.flag.store(true, Ordering::SeqCst);

        let waker = self.state.blocker.lock().clone();
        if let Some(wake) = waker {
            wake();
        }
        self.thread.unpark();
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("thread", &self.thread.id())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Interrupter for the calling thread.
pub fn current() -> Interrupter {
    Interrupter {
        state: current_state(),
        thread: thread::current(),
    }
}

/// Whether the calling thread's flag is set. Does not clear it.
pub fn is_interrupted() -> bool {
    CURRENT.with(|state| state.flag.load(Ordering::SeqCst))
}

/// Test and clear the calling thread's flag.
pub fn interrupted() -> bool {
    CURRENT.with(|state| state.flag.swap(false, Ordering::SeqCst))
}

/// Marker error: the calling thread was interrupted while blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("thread interrupted")]
pub struct Interrupted;

/// Registration of a waker for the calling thread's current wait.
///
/// The waker must take the lock the waiter re-checks the flag under before
/// notifying, otherwise the wakeup can be lost.
pub(crate) struct BlockerGuard {
    state: Arc<InterruptState>,
}

pub(crate) fn register_blocker(wake: Waker) -> BlockerGuard {
    let state = current_state();
    *state.blocker.lock() = Some(wake);
    BlockerGuard { state }
}

impl Drop for BlockerGuard {
    fn drop(&mut self) {
        *self.state.blocker.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_flag_is_per_thread() {
        assert!(!is_interrupted());

        let (tx, rx) = mpsc::channel();
        let other = thread::spawn(move || {
            tx.send(current()).unwrap();
            thread::park();
            while !is_interrupted() {
                thread::park();
            }
        });

        let handle = rx.recv().unwrap();
        handle.interrupt();
        other.join().unwrap();

        assert!(handle.is_interrupted());
        assert!(!is_interrupted());
    }

    #[test]
    fn test_interrupted_clears_flag() {
        current().interrupt();
        assert!(is_interrupted());
        assert!(interrupted());
        assert!(!interrupted());
        assert!(!is_interrupted());
    }

    #[test]
    fn test_registered_waker_runs_on_interrupt() {
        use std::sync::atomic::AtomicUsize;

        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        let guard = register_blocker(Arc::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        current().interrupt();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(guard);
        current().interrupt();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        interrupted();
    }
}
