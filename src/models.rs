use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::backend::{Document, FieldValue, Fields};

pub type TaskId = String;

pub const TASKS_COLLECTION: &str = "tasks";

pub const FIELD_USER_ID: &str = "userId";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DATE: &str = "date";
pub const FIELD_COMPLETE: &str = "complete";

/// Maximum title length accepted by the input forms, in characters.
pub const MAX_TITLE_CHARS: usize = 30;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub id: TaskId,
    pub owner_id: String,
    pub title: String,
    pub due_date: NaiveDate,
    pub complete: bool,
}

impl Task {
    /// Field set written when a task document is first created.
    pub fn new_fields(owner_id: &str, title: &str, due_date: NaiveDate) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_USER_ID.to_string(), FieldValue::from(owner_id));
        fields.insert(FIELD_TITLE.to_string(), FieldValue::from(title));
        fields.insert(
            FIELD_DATE.to_string(),
            FieldValue::String(format_due_date(due_date)),
        );
        fields.insert(FIELD_COMPLETE.to_string(), FieldValue::Bool(false));
        fields
    }

    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        let owner_id = string_field(doc, FIELD_USER_ID)?;
        let title = string_field(doc, FIELD_TITLE)?;
        let raw_date = string_field(doc, FIELD_DATE)?;
        let due_date = parse_due_date(&raw_date).ok_or_else(|| DocumentError {
            id: doc.id.clone(),
            reason: format!("unparseable date {raw_date:?}"),
        })?;
        let complete = match doc.fields.get(FIELD_COMPLETE) {
            Some(FieldValue::Bool(value)) => *value,
            Some(other) => {
                return Err(DocumentError {
                    id: doc.id.clone(),
                    reason: format!("field {FIELD_COMPLETE} has wrong type: {other:?}"),
                })
            }
            None => {
                return Err(DocumentError {
                    id: doc.id.clone(),
                    reason: format!("missing field {FIELD_COMPLETE}"),
                })
            }
        };
        Ok(Self {
            id: doc.id.clone(),
            owner_id,
            title,
            due_date,
            complete,
        })
    }
}

fn string_field(doc: &Document, name: &str) -> Result<String, DocumentError> {
    match doc.fields.get(name) {
        Some(FieldValue::String(value)) => Ok(value.clone()),
        Some(other) => Err(DocumentError {
            id: doc.id.clone(),
            reason: format!("field {name} has wrong type: {other:?}"),
        }),
        None => Err(DocumentError {
            id: doc.id.clone(),
            reason: format!("missing field {name}"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed task document {id}: {reason}")]
pub struct DocumentError {
    pub id: String,
    pub reason: String,
}

/// `YYYY-MM-DD`, zero padded. Stored dates are compared by exact string match.
pub fn format_due_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// Today's date in the local calendar (not UTC).
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "date", rename_all = "snake_case")]
pub enum Scope {
    Day(NaiveDate),
    All,
}

impl Scope {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Scope::Day(date) => Some(*date),
            Scope::All => None,
        }
    }
}

impl From<Option<NaiveDate>> for Scope {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(Scope::Day).unwrap_or(Scope::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityFilter {
    ShowAllIncludingComplete,
    #[default]
    HideComplete,
}

impl VisibilityFilter {
    pub fn admits(&self, task: &Task) -> bool {
        match self {
            VisibilityFilter::ShowAllIncludingComplete => true,
            VisibilityFilter::HideComplete => !task.complete,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    pub api_key: String,
    pub project_id: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_firestore_base_url")]
    pub firestore_base_url: String,
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    /// Exchanges refresh tokens for fresh ID tokens.
    #[serde(default = "default_token_base_url")]
    pub token_base_url: String,
}

impl BackendConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            database: default_database(),
            firestore_base_url: default_firestore_base_url(),
            auth_base_url: default_auth_base_url(),
            token_base_url: default_token_base_url(),
        }
    }

    /// `DATEBOOK_API_KEY` / `DATEBOOK_PROJECT_ID` take precedence over file values.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(key) = non_empty_env("DATEBOOK_API_KEY") {
            self.api_key = key;
        }
        if let Some(project) = non_empty_env("DATEBOOK_PROJECT_ID") {
            self.project_id = project;
        }
        self
    }

    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.firestore_base_url.trim_end_matches('/'),
            self.project_id,
            self.database
        )
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_firestore_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_auth_base_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_token_base_url() -> String {
    "https://securetoken.googleapis.com/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoredSession {
    pub identity: Identity,
    pub id_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionFile {
    pub schema_version: u32,
    pub session: Option<StoredSession>,
}
