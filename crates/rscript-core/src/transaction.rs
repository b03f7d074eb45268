//! Running a callback inside a host transaction.

use std::panic::{self, AssertUnwindSafe};

use crate::host::{Document, HostError, Transaction, TransactionStatus};

/// Run `callback` inside a transaction named `name` on `document`.
///
/// `Ok` commits. `Err` or a panic rolls the transaction back if it is still
/// started, then the original error is returned (or the original panic
/// resumed) unchanged. Host failures to begin or commit are converted into
/// `E`. A failed rollback is logged and never replaces the original error.
pub fn run_in_transaction<T, E, F>(document: &dyn Document, name: &str, callback: F) -> Result<T, E>
where
    E: From<HostError>,
    F: FnOnce(&dyn Document) -> Result<T, E>,
{
    let mut transaction = document.begin_transaction(name)?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(document)));

    match outcome {
        Ok(Ok(value)) => match transaction.commit() {
            Ok(()) => Ok(value),
            Err(err) => {
                roll_back(transaction.as_mut());
                Err(err.into())
            }
        },
        Ok(Err(err)) => {
            roll_back(transaction.as_mut());
            Err(err)
        }
        Err(payload) => {
            roll_back(transaction.as_mut());
            drop(transaction);
            panic::resume_unwind(payload)
        }
    }
}

fn roll_back(transaction: &mut dyn Transaction) {
    if transaction.status() != TransactionStatus::Started {
        return;
    }
    if let Err(err) = transaction.rollback() {
        tracing::warn!(transaction = transaction.name(), error = %err, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;

    #[derive(Debug, PartialEq)]
    enum ScriptError {
        Host(HostError),
        Invalid(&'static str),
    }

    impl From<HostError> for ScriptError {
        fn from(err: HostError) -> Self {
            ScriptError::Host(err)
        }
    }

    #[test]
    fn test_success_commits() {
        let doc = MemoryDocument::new("Model");
        let value = run_in_transaction(&doc, "Set", |d| {
            d.set_parameter("a", "1")?;
            Ok::<_, ScriptError>(42)
        })
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(doc.parameter("a").as_deref(), Some("1"));
        assert_eq!(doc.history(), vec!["Set"]);
    }

    #[test]
    fn test_error_rolls_back_and_returns_original() {
        let doc = MemoryDocument::with_parameters("Model", [("a", "1")]);
        let err = run_in_transaction(&doc, "Bad edit", |d| {
            d.set_parameter("a", "2")?;
            Err::<(), _>(ScriptError::Invalid("width must be positive"))
        })
        .unwrap_err();

        assert_eq!(err, ScriptError::Invalid("width must be positive"));
        assert_eq!(doc.parameter("a").as_deref(), Some("1"));
        assert!(doc.history().is_empty());
        assert!(!doc.has_open_transaction());
    }

    #[test]
    fn test_panic_rolls_back_and_resumes_original_payload() {
        let doc = MemoryDocument::new("Model");
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = run_in_transaction(&doc, "Crash", |d| {
                d.set_parameter("x", "1")?;
                if d.parameter("x").is_some() {
                    panic!("original failure");
                }
                Ok::<(), ScriptError>(())
            });
        }));

        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"original failure"));
        assert!(doc.parameters().is_empty());
        assert!(!doc.has_open_transaction());
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let doc = MemoryDocument::new("Model");
        doc.reject_commits(true);
        let err = run_in_transaction(&doc, "Rejected", |d| {
            d.set_parameter("x", "1")?;
            Ok::<(), ScriptError>(())
        })
        .unwrap_err();

        assert!(matches!(err, ScriptError::Host(HostError::Rejected(_))));
        assert!(doc.parameters().is_empty());
        assert!(!doc.has_open_transaction());
    }

    #[test]
    fn test_begin_failure_skips_callback() {
        let doc = MemoryDocument::new("Model");
        let _open = doc.begin_transaction("Outer").unwrap();
        let mut called = false;
        let err = run_in_transaction(&doc, "Inner", |_| {
            called = true;
            Ok::<(), ScriptError>(())
        })
        .unwrap_err();

        assert!(!called);
        assert_eq!(err, ScriptError::Host(HostError::TransactionOpen("Outer".to_string())));
    }
}
