use crate::executor::PanicInfo;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user computations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pool and configuration level errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("pool {0} has been shut down")]
    PoolShutdown(u64),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }
}

/// Misuse of the task-group API, reported at the offending call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("a child named `{0}` is already registered")]
    DuplicateName(String),

    #[error("operation not allowed after start()")]
    AlreadyStarted,

    #[error("no child named `{0}`")]
    UnknownName(String),
}

/// Why a computation did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Cause {
    /// The computation returned an error.
    #[error("computation failed: {0}")]
    ComputationFailed(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The computation panicked on its worker thread.
    #[error("computation panicked: {0}")]
    Panicked(PanicInfo),

    /// The pool refused the work, so the computation never ran.
    #[error("work rejected: {0}")]
    Rejected(String),

    /// The waiting thread was interrupted; the computation itself is unaffected.
    #[error("interrupted while waiting for the result")]
    Interrupted,
}

/// The single error surfaced by `get()` on task handles and aggregators.
#[derive(Debug, Clone, thiserror::Error)]
#[error("initialization failed: {cause}")]
pub struct InitializationError {
    #[source]
    cause: Cause,
}

impl InitializationError {
    pub fn new(cause: Cause) -> Self {
        Self { cause }
    }

    pub fn computation(err: BoxError) -> Self {
        Self::new(Cause::ComputationFailed(Arc::from(err)))
    }

    pub fn interrupted() -> Self {
        Self::new(Cause::Interrupted)
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self::new(Cause::Rejected(reason.into()))
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn into_cause(self) -> Cause {
        self.cause
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.cause, Cause::Interrupted)
    }

    /// The error the computation returned, if that is what failed.
    pub fn computation_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match &self.cause {
            Cause::ComputationFailed(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.computation_error()?.downcast_ref::<E>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("disk on fire")]
    struct DiskOnFire;

    #[test]
    fn test_computation_cause_is_preserved() {
        let err = InitializationError::computation(Box::new(DiskOnFire));

        assert!(!err.is_interrupted());
        assert_eq!(err.downcast_ref::<DiskOnFire>(), Some(&DiskOnFire));
        assert_eq!(err.to_string(), "initialization failed: computation failed: disk on fire");

        let source = err.source().unwrap();
        assert!(source.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_interrupted_has_no_computation_error() {
        let err = InitializationError::interrupted();
        assert!(err.is_interrupted());
        assert!(err.computation_error().is_none());
        assert!(matches!(err.into_cause(), Cause::Interrupted));
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: Error = ProtocolError::UnknownName("db".into()).into();
        assert_eq!(err.to_string(), "no child named `db`");
    }
}
