//! In-process backend: a document store and a session provider held in memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{
    Direction, Document, DocumentStore, Fields, OrderBy, Predicate, RemoteError, SessionProvider,
};
use crate::models::Identity;

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<String, Vec<Document>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let guard = self.inner.lock().expect("store poisoned");
        guard.get(collection).cloned().unwrap_or_default()
    }

    pub fn get(&self, collection: &str, doc_id: &str) -> Option<Document> {
        let guard = self.inner.lock().expect("store poisoned");
        guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == doc_id).cloned())
    }

    /// Seeds a document with a caller-chosen id.
    pub fn put(&self, collection: &str, doc_id: &str, fields: Fields) {
        let mut guard = self.inner.lock().expect("store poisoned");
        let docs = guard.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|doc| doc.id == doc_id) {
            Some(existing) => existing.fields = fields,
            None => docs.push(Document {
                id: doc_id.to_string(),
                fields,
            }),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: &OrderBy,
    ) -> Result<Vec<Document>, RemoteError> {
        let mut out: Vec<Document> = self
            .documents(collection)
            .into_iter()
            .filter(|doc| predicates.iter().all(|p| p.matches(&doc.fields)))
            // Documents without the ordering field are excluded, as the hosted store does.
            .filter(|doc| doc.fields.contains_key(&order_by.field))
            .collect();
        // Stable sort keeps insertion order for ties.
        out.sort_by(|a, b| {
            let ordering = a.fields.get(&order_by.field).cmp(&b.fields.get(&order_by.field));
            match order_by.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
        Ok(out)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut guard = self.inner.lock().expect("store poisoned");
        guard
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        Ok(id)
    }

    async fn update_fields(
        &self,
        collection: &str,
        doc_id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError> {
        let mut guard = self.inner.lock().expect("store poisoned");
        let doc = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == doc_id))
            .ok_or_else(|| RemoteError::NotFound(format!("{collection}/{doc_id}")))?;
        doc.fields.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), RemoteError> {
        let mut guard = self.inner.lock().expect("store poisoned");
        if let Some(docs) = guard.get_mut(collection) {
            docs.retain(|doc| doc.id != doc_id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password: String,
}

#[derive(Debug, Default)]
struct SessionData {
    accounts: BTreeMap<String, Account>,
    current: Option<Identity>,
}

/// Email/password accounts held in memory. Error messages follow the hosted
/// provider's codes so callers see the same text either way.
#[derive(Clone, Default)]
pub struct MemorySession {
    inner: Arc<Mutex<SessionData>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that is already signed in as `uid`.
    pub fn signed_in(uid: &str) -> Self {
        let session = Self::new();
        {
            let mut guard = session.inner.lock().expect("session poisoned");
            guard.current = Some(Identity {
                uid: uid.to_string(),
                email: None,
            });
        }
        session
    }
}

#[async_trait]
impl SessionProvider for MemorySession {
    fn current_identity(&self) -> Option<Identity> {
        let guard = self.inner.lock().expect("session poisoned");
        guard.current.clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, RemoteError> {
        let mut guard = self.inner.lock().expect("session poisoned");
        let account = guard
            .accounts
            .get(email)
            .cloned()
            .ok_or_else(|| RemoteError::Auth("EMAIL_NOT_FOUND".to_string()))?;
        if account.password != password {
            return Err(RemoteError::Auth("INVALID_PASSWORD".to_string()));
        }
        let identity = Identity {
            uid: account.uid,
            email: Some(email.to_string()),
        };
        guard.current = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, RemoteError> {
        if email.is_empty() {
            return Err(RemoteError::Auth("MISSING_EMAIL".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(RemoteError::Auth(
                "WEAK_PASSWORD : Password should be at least 6 characters".to_string(),
            ));
        }
        let mut guard = self.inner.lock().expect("session poisoned");
        if guard.accounts.contains_key(email) {
            return Err(RemoteError::Auth("EMAIL_EXISTS".to_string()));
        }
        let uid = uuid::Uuid::new_v4().simple().to_string();
        guard.accounts.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        let identity = Identity {
            uid,
            email: Some(email.to_string()),
        };
        guard.current = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let mut guard = self.inner.lock().expect("session poisoned");
        guard.current = None;
        Ok(())
    }
}
