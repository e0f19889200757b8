use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs jobs on a worker, isolating panics so the worker survives them.
#[derive(Debug, Default)]
pub struct PanicHandler {
    panic_count: AtomicUsize,
}

impl PanicHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute<F, R>(&self, f: F) -> Result<R, PanicInfo>
    where
        F: FnOnce() -> R,
    {
        catch_panic(f).map_err(|info| {
            self.panic_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(panic = %info.message, "job panicked on worker");
            info
        })
    }

    pub fn panic_count(&self) -> usize {
        self.panic_count.load(Ordering::Relaxed)
    }
}

/// Payload of a caught panic, reduced to its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        Self { message }
    }
}

impl fmt::Display for PanicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub(crate) fn catch_panic<F, R>(f: F) -> Result<R, PanicInfo>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(PanicInfo::from_payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_handler_isolates() {
        let handler = PanicHandler::new();

        let result = handler.execute(|| {
            panic!("test panic");
        });

        assert_eq!(result.unwrap_err().message, "test panic");
        assert_eq!(handler.panic_count(), 1);
    }

    #[test]
    fn test_panic_handler_success() {
        let handler = PanicHandler::new();

        let result = handler.execute(|| 42);

        assert_eq!(result.unwrap(), 42);
        assert_eq!(handler.panic_count(), 0);
    }

    #[test]
    fn test_formatted_panic_message() {
        let info = catch_panic(|| panic!("bad value {}", 7)).unwrap_err();
        assert_eq!(info.to_string(), "bad value 7");
    }
}
