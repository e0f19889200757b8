//! Single-write, multi-read slot between a worker and its waiters.

use crate::interrupt::{self, Interrupted};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

pub(crate) struct ResultCell<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> ResultCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Store `value` unless something is already stored. Returns whether this
    /// call wrote the cell.
    pub fn set(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        drop(slot);
        self.ready.notify_all();
        true
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Look at the current content without copying it.
    pub fn inspect<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.slot.lock().as_ref())
    }
}

impl<T: Clone> ResultCell<T> {
    pub fn peek(&self) -> Option<T> {
        self.slot.lock().clone()
    }
}

impl<T: Clone + Send + 'static> ResultCell<T> {
    /// Block until the cell is written and return a copy of its content.
    ///
    /// A value already present is returned even if the caller is
    /// interrupted. Otherwise an interruption ends the wait with
    /// [`Interrupted`] and clears the caller's flag.
    pub fn wait(self: &Arc<Self>) -> Result<T, Interrupted> {
        let cell = Arc::clone(self);
        let _blocker = interrupt::register_blocker(Arc::new(move || {
            let _slot = cell.slot.lock();
            cell.ready.notify_all();
        }));

        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return Ok(value.clone());
            }
            if interrupt::interrupted() {
                return Err(Interrupted);
            }
            self.ready.wait(&mut slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_first_write_wins() {
        let cell = ResultCell::new();
        assert!(!cell.is_set());
        assert!(cell.set(1));
        assert!(!cell.set(2));
        assert_eq!(cell.peek(), Some(1));
    }

    #[test]
    fn test_all_waiters_see_the_same_value() {
        let cell: Arc<ResultCell<String>> = Arc::new(ResultCell::new());

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || cell.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        cell.set(String::from("ready"));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().unwrap(), "ready");
        }
    }

    #[test]
    fn test_interrupt_ends_wait_and_clears_flag() {
        let cell: Arc<ResultCell<u32>> = Arc::new(ResultCell::new());
        let (tx, rx) = std::sync::mpsc::channel();

        let waiter = {
            let cell = cell.clone();
            thread::spawn(move || {
                tx.send(interrupt::current()).unwrap();
                let result = cell.wait();
                (result, interrupt::is_interrupted())
            })
        };

        thread::sleep(Duration::from_millis(20));
        rx.recv().unwrap().interrupt();

        let (result, still_flagged) = waiter.join().unwrap();
        assert_eq!(result, Err(Interrupted));
        assert!(!still_flagged);
        assert!(!cell.is_set());
    }

    #[test]
    fn test_present_value_beats_pending_interrupt() {
        let cell = Arc::new(ResultCell::new());
        cell.set(5u8);

        interrupt::current().interrupt();
        assert_eq!(cell.wait(), Ok(5));
        assert!(interrupt::interrupted());
    }
}
