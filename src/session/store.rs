//! Document store mapping sessions to their current document.
//!
//! Uploads and commands arrive on concurrent control-plane tasks, so the map
//! sits behind a `RwLock` and each session behind its own `Mutex`. All
//! read-modify-write access to one session happens under that session's lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::session::{DocumentRef, Session, SessionId};

/// Process-wide session map.
pub struct DocumentStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn get_or_create(&self, id: &SessionId) -> Arc<Mutex<Session>> {
        // Fast path: check if session exists
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return Arc::clone(session);
            }
        }

        // Slow path: double-check after acquiring write lock
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return Arc::clone(session);
        }

        let session = Arc::new(Mutex::new(Session::new(id.clone())));
        sessions.insert(id.clone(), Arc::clone(&session));
        tracing::debug!(session = %id, "Created session");
        session
    }

    async fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Make `document` the session's current document (last write wins).
    pub async fn record_upload(&self, id: &SessionId, document: DocumentRef) {
        let session = self.get_or_create(id).await;
        let mut sess = session.lock().await;
        if let Some(previous) = sess.last_document.replace(document) {
            tracing::debug!(session = %id, previous = %previous, "Replaced current document");
        }
        sess.touch();
    }

    /// Current document, or `None` if nothing was uploaded or the file is gone.
    pub async fn current(&self, id: &SessionId) -> Option<DocumentRef> {
        let session = self.get(id).await?;
        let document = session.lock().await.last_document.clone()?;
        if document.exists().await {
            Some(document)
        } else {
            tracing::debug!(session = %id, document = %document, "Current document no longer exists");
            None
        }
    }

    /// Append a document to the merge set. Returns the new set length.
    pub async fn add_to_merge_set(&self, id: &SessionId, document: DocumentRef) -> usize {
        let session = self.get_or_create(id).await;
        let mut sess = session.lock().await;
        sess.merge_set.push(document);
        sess.touch();
        sess.merge_set.len()
    }

    /// Drain the merge set, leaving it empty.
    pub async fn take_merge_set(&self, id: &SessionId) -> Vec<DocumentRef> {
        match self.get(id).await {
            Some(session) => {
                let mut sess = session.lock().await;
                sess.touch();
                std::mem::take(&mut sess.merge_set)
            }
            None => Vec::new(),
        }
    }

    /// Put documents back at the front of the merge set.
    pub async fn restore_merge_set(&self, id: &SessionId, documents: Vec<DocumentRef>) {
        if documents.is_empty() {
            return;
        }
        let session = self.get_or_create(id).await;
        let mut sess = session.lock().await;
        let newer = std::mem::replace(&mut sess.merge_set, documents);
        sess.merge_set.extend(newer);
    }

    pub async fn merge_set_len(&self, id: &SessionId) -> usize {
        match self.get(id).await {
            Some(session) => session.lock().await.merge_set.len(),
            None => 0,
        }
    }

    /// Forget a session entirely. Returns whether it existed.
    pub async fn clear(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
