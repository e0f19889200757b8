use super::handle::{Outcome, TaskHandle};
use crate::error::{InitializationError, ProtocolError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct ChildResult<T> {
    handle: TaskHandle<T>,
    outcome: Outcome<T>,
}

/// Read-only report over the finished children of an
/// [`Aggregator`](super::Aggregator), keyed by child name.
///
/// Lookups of names that were never registered fail with
/// [`ProtocolError::UnknownName`].
pub struct ResultsView<T> {
    children: Arc<HashMap<String, ChildResult<T>>>,
}

impl<T> ResultsView<T> {
    pub(crate) fn new(outcomes: Vec<(String, TaskHandle<T>, Outcome<T>)>) -> Self {
        let children = outcomes
            .into_iter()
            .map(|(name, handle, outcome)| (name, ChildResult { handle, outcome }))
            .collect();
        Self {
            children: Arc::new(children),
        }
    }

    fn child(&self, name: &str) -> Result<&ChildResult<T>, ProtocolError> {
        self.children
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownName(name.to_string()))
    }

    /// Registered child names, in no particular order.
    pub fn names(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The child's value, or `None` if its computation failed.
    pub fn value(&self, name: &str) -> Result<Option<&T>, ProtocolError> {
        Ok(self.child(name)?.outcome.as_ref().ok())
    }

    pub fn failed(&self, name: &str) -> Result<bool, ProtocolError> {
        Ok(self.child(name)?.outcome.is_err())
    }

    /// Why the child failed, or `None` if it succeeded.
    pub fn cause(&self, name: &str) -> Result<Option<&InitializationError>, ProtocolError> {
        Ok(self.child(name)?.outcome.as_ref().err())
    }

    pub fn handle(&self, name: &str) -> Result<&TaskHandle<T>, ProtocolError> {
        Ok(&self.child(name)?.handle)
    }

    /// `true` when no child failed.
    pub fn is_successful(&self) -> bool {
        self.children.values().all(|child| child.outcome.is_ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Result<&T, &InitializationError>)> + '_ {
        self.children
            .iter()
            .map(|(name, child)| (name.as_str(), child.outcome.as_ref()))
    }
}

impl<T> Clone for ResultsView<T> {
    fn clone(&self) -> Self {
        Self {
            children: Arc::clone(&self.children),
        }
    }
}

impl<T> fmt::Debug for ResultsView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<&str> = self
            .children
            .iter()
            .filter(|(_, child)| child.outcome.is_err())
            .map(|(name, _)| name.as_str())
            .collect();
        f.debug_struct("ResultsView")
            .field("children", &self.children.len())
            .field("failed", &failed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    fn view() -> ResultsView<i32> {
        let ok = TaskHandle::new(|| Ok::<_, BoxError>(1));
        let bad = TaskHandle::new(|| Ok::<_, BoxError>(2));
        ResultsView::new(vec![
            ("ok".to_string(), ok, Ok(1)),
            ("bad".to_string(), bad, Err(InitializationError::rejected("pool closed"))),
        ])
    }

    #[test]
    fn test_lookups() {
        let view = view();

        let mut names = view.names();
        names.sort();
        assert_eq!(names, vec!["bad", "ok"]);

        assert_eq!(view.value("ok").unwrap(), Some(&1));
        assert_eq!(view.value("bad").unwrap(), None);
        assert!(view.failed("bad").unwrap());
        assert!(!view.failed("ok").unwrap());
        assert!(view.cause("ok").unwrap().is_none());
        assert!(view.cause("bad").unwrap().unwrap().to_string().contains("pool closed"));
        assert!(!view.is_successful());
        assert_eq!(view.iter().filter(|(_, r)| r.is_ok()).count(), 1);
    }

    #[test]
    fn test_unknown_name() {
        let view = view();
        let missing = ProtocolError::UnknownName("cache".into());

        assert_eq!(view.value("cache").unwrap_err(), missing);
        assert_eq!(view.failed("cache").unwrap_err(), missing);
        assert!(view.cause("cache").is_err());
        assert!(view.handle("cache").is_err());
    }
}
