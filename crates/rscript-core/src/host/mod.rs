//! Interfaces to the host application.
//!
//! The host owns documents, their transactions and the UI thread. Everything
//! here is implemented by the embedding application; [`memory`] provides a
//! standalone implementation for tests and the `rscript-host` binary.

pub mod memory;
mod ui_thread;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use memory::{MemoryApplication, MemoryDocument, MemoryTransaction, MemoryUiDocument};
pub use ui_thread::UiThread;

/// Failures reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Active document is not available. Please open a document.")]
    NoActiveDocument,

    #[error("parameters can only be changed inside a transaction")]
    NoOpenTransaction,

    #[error("transaction '{0}' is already open")]
    TransactionOpen(String),

    #[error("transaction '{name}' cannot change state: it is {status}")]
    InvalidTransactionState {
        name: String,
        status: TransactionStatus,
    },

    #[error("UI thread is not available: {0}")]
    DispatcherUnavailable(String),

    #[error("{0}")]
    Rejected(String),
}

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    NotStarted,
    Started,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::NotStarted => "not started",
            TransactionStatus::Started => "started",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// A named unit of work on a document.
pub trait Transaction {
    fn name(&self) -> &str;
    fn status(&self) -> TransactionStatus;
    fn commit(&mut self) -> Result<(), HostError>;
    fn rollback(&mut self) -> Result<(), HostError>;
}

/// A host document. Only touched on the UI thread.
pub trait Document {
    fn title(&self) -> String;
    fn parameter(&self, key: &str) -> Option<String>;
    fn set_parameter(&self, key: &str, value: &str) -> Result<(), HostError>;
    fn remove_parameter(&self, key: &str) -> Result<Option<String>, HostError>;
    /// Start a transaction; the returned value is already `Started`.
    fn begin_transaction(&self, name: &str) -> Result<Box<dyn Transaction + '_>, HostError>;
}

/// The document as shown in the UI, with its selection.
pub trait UiDocument {
    fn document(&self) -> Arc<dyn Document>;
    fn selection(&self) -> Vec<String>;
}

/// The running host application.
pub trait HostApplication: Send + Sync {
    fn active_document(&self) -> Option<Arc<dyn Document>>;
    fn active_ui_document(&self) -> Option<Arc<dyn UiDocument>>;
}

/// Work posted to the UI thread.
pub type UiCallback = Box<dyn FnOnce() + Send + 'static>;

/// The host's "run this on the UI thread" primitive.
pub trait UiDispatcher: Send + Sync {
    /// Schedule `callback`. Returns once it is queued, not once it ran.
    fn run_on_ui_thread(&self, callback: UiCallback) -> Result<(), HostError>;
}
