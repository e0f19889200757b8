//! Idle backoff for pool workers: spin, then yield, then park.

use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    // submitters and shutdown unpark workers; the timeout only covers a wakeup
    // that went to a busy sibling
    const PARK_TIMEOUT: Duration = Duration::from_millis(10);

    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Wait a little longer than last time.
    ///
    /// Once spinning and yielding are exhausted the thread parks; an `unpark`
    /// from a submitter ends the park early, the timeout bounds it otherwise.
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::park_timeout(Self::PARK_TIMEOUT);
        }

        if self.step <= Self::YIELD_LIMIT {
            self.step += 1;
        }
    }

    /// Whether the next snooze will park the thread.
    pub fn is_parking(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::new();
        assert!(!backoff.is_parking());

        for _ in 0..20 {
            backoff.snooze();
        }

        assert!(backoff.is_parking());
    }

    #[test]
    fn test_idle_park_is_not_a_busy_poll() {
        let mut backoff = Backoff::new();
        while !backoff.is_parking() {
            backoff.snooze();
        }

        let parks = 5;
        let start = std::time::Instant::now();
        for _ in 0..parks {
            backoff.snooze();
        }
        // spurious wakeups are allowed, so only check the order of magnitude
        assert!(start.elapsed() >= Backoff::PARK_TIMEOUT * parks / 2);
    }

    #[test]
    fn test_unpark_ends_park_early() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{mpsc, Arc};

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let flag = stop.clone();
        let parked = thread::spawn(move || {
            let mut backoff = Backoff::new();
            while !backoff.is_parking() {
                backoff.snooze();
            }
            ready_tx.send(()).unwrap();
            while !flag.load(Ordering::Acquire) {
                backoff.snooze();
            }
            done_tx.send(()).unwrap();
        });

        ready_rx.recv().unwrap();
        stop.store(true, Ordering::Release);
        parked.thread().unpark();

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        parked.join().unwrap();
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new();

        for _ in 0..20 {
            backoff.snooze();
        }
        assert!(backoff.is_parking());

        backoff.reset();
        assert!(!backoff.is_parking());
    }
}
