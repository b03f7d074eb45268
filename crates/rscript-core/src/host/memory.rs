//! In-memory host: documents as key/value parameter maps.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Document, HostApplication, HostError, Transaction, TransactionStatus, UiDocument};

#[derive(Debug, Default)]
struct DocumentState {
    parameters: BTreeMap<String, String>,
    open: Option<OpenTransaction>,
    history: Vec<String>,
    next_id: u64,
    reject_commits: bool,
}

#[derive(Debug)]
struct OpenTransaction {
    id: u64,
    name: String,
    snapshot: BTreeMap<String, String>,
}

fn lock(state: &Mutex<DocumentState>) -> MutexGuard<'_, DocumentState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A document whose content is a sorted parameter map.
///
/// Changes require an open transaction; rollback restores the snapshot taken
/// when the transaction began.
#[derive(Debug)]
pub struct MemoryDocument {
    title: String,
    state: Arc<Mutex<DocumentState>>,
}

impl MemoryDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            state: Arc::default(),
        }
    }

    pub fn with_parameters<K, V>(title: impl Into<String>, parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let document = Self::new(title);
        lock(&document.state).parameters = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        document
    }

    /// Current parameters.
    pub fn parameters(&self) -> BTreeMap<String, String> {
        lock(&self.state).parameters.clone()
    }

    /// Names of committed transactions, oldest first.
    pub fn history(&self) -> Vec<String> {
        lock(&self.state).history.clone()
    }

    pub fn has_open_transaction(&self) -> bool {
        lock(&self.state).open.is_some()
    }

    /// Make every following commit fail, as a host would on a failed
    /// regeneration.
    pub fn reject_commits(&self, reject: bool) {
        lock(&self.state).reject_commits = reject;
    }
}

impl Document for MemoryDocument {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn parameter(&self, key: &str) -> Option<String> {
        lock(&self.state).parameters.get(key).cloned()
    }

    fn set_parameter(&self, key: &str, value: &str) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if state.open.is_none() {
            return Err(HostError::NoOpenTransaction);
        }
        state.parameters.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_parameter(&self, key: &str) -> Result<Option<String>, HostError> {
        let mut state = lock(&self.state);
        if state.open.is_none() {
            return Err(HostError::NoOpenTransaction);
        }
        Ok(state.parameters.remove(key))
    }

    fn begin_transaction(&self, name: &str) -> Result<Box<dyn Transaction + '_>, HostError> {
        let mut state = lock(&self.state);
        if let Some(open) = &state.open {
            return Err(HostError::TransactionOpen(open.name.clone()));
        }
        state.next_id += 1;
        let id = state.next_id;
        let snapshot = state.parameters.clone();
        state.open = Some(OpenTransaction {
            id,
            name: name.to_string(),
            snapshot,
        });
        Ok(Box::new(MemoryTransaction {
            id,
            name: name.to_string(),
            status: TransactionStatus::Started,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Transaction on a [`MemoryDocument`]. Rolls back if dropped while started.
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    name: String,
    status: TransactionStatus,
    state: Arc<Mutex<DocumentState>>,
}

impl MemoryTransaction {
    fn ensure_started(&self) -> Result<(), HostError> {
        if self.status != TransactionStatus::Started {
            return Err(HostError::InvalidTransactionState {
                name: self.name.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> TransactionStatus {
        self.status
    }

    fn commit(&mut self) -> Result<(), HostError> {
        self.ensure_started()?;
        let mut state = lock(&self.state);
        if state.reject_commits {
            return Err(HostError::Rejected(format!(
                "commit of '{}' was rejected by the document",
                self.name
            )));
        }
        if state.open.as_ref().is_some_and(|open| open.id == self.id) {
            state.open = None;
        }
        state.history.push(self.name.clone());
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), HostError> {
        self.ensure_started()?;
        let mut state = lock(&self.state);
        if state.open.as_ref().is_some_and(|open| open.id == self.id) {
            if let Some(open) = state.open.take() {
                state.parameters = open.snapshot;
            }
        }
        self.status = TransactionStatus::RolledBack;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Started {
            tracing::warn!(transaction = %self.name, "transaction dropped while open, rolling back");
            let _ = self.rollback();
        }
    }
}

/// UI view of a [`MemoryDocument`].
pub struct MemoryUiDocument {
    document: Arc<MemoryDocument>,
    selection: Vec<String>,
}

impl UiDocument for MemoryUiDocument {
    fn document(&self) -> Arc<dyn Document> {
        self.document.clone()
    }

    fn selection(&self) -> Vec<String> {
        self.selection.clone()
    }
}

/// Host application holding at most one open document.
#[derive(Debug, Default)]
pub struct MemoryApplication {
    document: Mutex<Option<Arc<MemoryDocument>>>,
    selection: Mutex<Vec<String>>,
}

impl MemoryApplication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Application with `document` already open.
    pub fn with_document(document: MemoryDocument) -> Self {
        let app = Self::new();
        app.open(document);
        app
    }

    /// Open `document`, replacing the active one.
    pub fn open(&self, document: MemoryDocument) -> Arc<MemoryDocument> {
        let document = Arc::new(document);
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(document.clone());
        document
    }

    pub fn close(&self) {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The active document, with its concrete type.
    pub fn document(&self) -> Option<Arc<MemoryDocument>> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the selection.
    pub fn select<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.selection.lock().unwrap_or_else(PoisonError::into_inner) =
            ids.into_iter().map(Into::into).collect();
    }
}

impl HostApplication for MemoryApplication {
    fn active_document(&self) -> Option<Arc<dyn Document>> {
        self.document().map(|d| d as Arc<dyn Document>)
    }

    fn active_ui_document(&self) -> Option<Arc<dyn UiDocument>> {
        let document = self.document()?;
        let selection = self
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Some(Arc::new(MemoryUiDocument {
            document,
            selection,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_need_a_transaction() {
        let doc = MemoryDocument::new("Model");
        assert_eq!(doc.set_parameter("a", "1"), Err(HostError::NoOpenTransaction));
        assert_eq!(doc.remove_parameter("a"), Err(HostError::NoOpenTransaction));
    }

    #[test]
    fn test_commit_keeps_changes() {
        let doc = MemoryDocument::new("Model");
        let mut tx = doc.begin_transaction("Set A").unwrap();
        doc.set_parameter("a", "1").unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Committed);
        drop(tx);

        assert_eq!(doc.parameter("a").as_deref(), Some("1"));
        assert_eq!(doc.history(), vec!["Set A"]);
        assert!(!doc.has_open_transaction());
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let doc = MemoryDocument::with_parameters("Model", [("a", "1")]);
        let mut tx = doc.begin_transaction("Edit").unwrap();
        doc.set_parameter("a", "2").unwrap();
        doc.set_parameter("b", "3").unwrap();
        tx.rollback().unwrap();
        drop(tx);

        assert_eq!(doc.parameters(), BTreeMap::from([("a".to_string(), "1".to_string())]));
        assert!(doc.history().is_empty());
    }

    #[test]
    fn test_drop_while_started_rolls_back() {
        let doc = MemoryDocument::new("Model");
        {
            let _tx = doc.begin_transaction("Abandoned").unwrap();
            doc.set_parameter("x", "1").unwrap();
        }
        assert!(doc.parameters().is_empty());
        assert!(!doc.has_open_transaction());
    }

    #[test]
    fn test_nested_begin_is_refused() {
        let doc = MemoryDocument::new("Model");
        let _outer = doc.begin_transaction("Outer").unwrap();
        let err = doc.begin_transaction("Inner").err().unwrap();
        assert_eq!(err, HostError::TransactionOpen("Outer".to_string()));
    }

    #[test]
    fn test_commit_twice_is_invalid() {
        let doc = MemoryDocument::new("Model");
        let mut tx = doc.begin_transaction("Once").unwrap();
        tx.commit().unwrap();
        assert!(matches!(
            tx.commit(),
            Err(HostError::InvalidTransactionState { .. })
        ));
    }

    #[test]
    fn test_application_document_and_selection() {
        let app = MemoryApplication::new();
        assert!(app.active_document().is_none());
        assert!(app.active_ui_document().is_none());

        app.open(MemoryDocument::new("Tower"));
        app.select(["wall-1", "door-7"]);
        let ui = app.active_ui_document().unwrap();
        assert_eq!(ui.document().title(), "Tower");
        assert_eq!(ui.selection(), vec!["wall-1", "door-7"]);

        app.close();
        assert!(app.active_document().is_none());
    }
}
