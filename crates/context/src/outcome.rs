//! A value-or-failure return type for scoped functions that report failure
//! without raising it.

use std::sync::Arc;

/// Either the value produced by a scoped function or the failure that
/// prevented it. Immutable once constructed.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The function produced a value.
    Value(T),
    /// The function failed.
    Error(Arc<anyhow::Error>),
}

impl<T> Outcome<T> {
    /// Wraps a successful value.
    pub fn of(value: T) -> Self {
        Outcome::Value(value)
    }

    /// Wraps a failure.
    pub fn error(error: impl Into<anyhow::Error>) -> Self {
        Outcome::Error(Arc::new(error.into()))
    }

    /// Returns `true` if this outcome carries a value.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// Returns the value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    /// Returns the failure, if any.
    pub fn failure(&self) -> Option<&anyhow::Error> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Error(e) => Some(e),
        }
    }

    /// Converts into a standard `Result`, sharing the failure.
    pub fn into_result(self) -> Result<T, Arc<anyhow::Error>> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Error(e) => Err(e),
        }
    }
}

impl<T: Clone> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Value(v) => Outcome::Value(v.clone()),
            Outcome::Error(e) => Outcome::Error(Arc::clone(e)),
        }
    }
}

impl<T> From<anyhow::Result<T>> for Outcome<T> {
    fn from(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(v) => Outcome::Value(v),
            Err(e) => Outcome::Error(Arc::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn value_has_no_failure() {
        let outcome = Outcome::of(7);
        assert!(outcome.is_ok());
        assert_eq!(outcome.value(), Some(&7));
        assert!(outcome.failure().is_none());
    }

    #[test]
    fn failure_has_no_value() {
        let outcome: Outcome<u32> = Outcome::error(anyhow!("resolve failed"));
        assert!(!outcome.is_ok());
        assert!(outcome.value().is_none());
        assert_eq!(outcome.failure().map(|e| e.to_string()).as_deref(), Some("resolve failed"));
    }

    #[test]
    fn clones_share_the_failure() {
        let outcome = Outcome::from(Err::<u32, _>(anyhow!("boom")));
        let copy = outcome.clone();
        match (outcome.into_result(), copy.into_result()) {
            (Err(a), Err(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("expected failures"),
        }
    }
}
