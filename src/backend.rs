//! Seams to the hosted backend: identity and document storage.
//!
//! The controller only ever talks to these two traits. `memory` provides an
//! in-process implementation; `firebase` provides the hosted one.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Identity;

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Integer(i64),
}

impl FieldValue {
    fn type_rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Integer(_) => 1,
            FieldValue::String(_) => 2,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Mixed types order by type first, the way the hosted store does.
impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub op: FieldOp,
    pub value: FieldValue,
}

impl Predicate {
    pub fn equals(field: &str, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.to_string(),
            op: FieldOp::Equal,
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self.op {
            FieldOp::Equal => fields.get(&self.field) == Some(&self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("auth rejected: {0}")]
    Auth(String),
    #[error("no signed-in session")]
    Unauthenticated,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, RemoteError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, RemoteError>;
    async fn sign_out(&self) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: &OrderBy,
    ) -> Result<Vec<Document>, RemoteError>;

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError>;

    async fn update_fields(
        &self,
        collection: &str,
        doc_id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), RemoteError>;
}
