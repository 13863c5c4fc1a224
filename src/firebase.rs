//! Hosted backend over the Firebase Auth and Cloud Firestore REST APIs.
//!
//! The JSON encoding lives in plain functions so it can be checked without a
//! network; the HTTP clients are only built with the `app` feature.

use serde_json::{json, Map, Value};

use crate::backend::{Direction, Document, FieldOp, FieldValue, Fields, OrderBy, Predicate, RemoteError};
use crate::models::{Identity, StoredSession};

#[cfg(all(feature = "app", not(test)))]
use std::sync::{Arc, Mutex};

#[cfg(all(feature = "app", not(test)))]
use async_trait::async_trait;

#[cfg(all(feature = "app", not(test)))]
use crate::backend::{DocumentStore, SessionProvider};
#[cfg(all(feature = "app", not(test)))]
use crate::logging::REMOTE_TARGET;
#[cfg(all(feature = "app", not(test)))]
use crate::models::BackendConfig;
#[cfg(all(feature = "app", not(test)))]
use crate::storage::Storage;

pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        // Firestore sends and accepts int64 as a decimal string.
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
    }
}

/// Returns `None` for value types this client does not model.
pub fn decode_value(value: &Value) -> Option<FieldValue> {
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return Some(FieldValue::String(s.to_string()));
    }
    if let Some(b) = value.get("booleanValue").and_then(Value::as_bool) {
        return Some(FieldValue::Bool(b));
    }
    match value.get("integerValue") {
        Some(Value::String(raw)) => raw.parse().ok().map(FieldValue::Integer),
        Some(Value::Number(n)) => n.as_i64().map(FieldValue::Integer),
        _ => None,
    }
}

pub fn encode_fields(fields: &Fields) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect();
    json!({ "fields": encoded })
}

pub fn decode_document(value: &Value) -> Result<Document, RemoteError> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Decode("document without name".to_string()))?;
    let id = name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RemoteError::Decode(format!("bad document name {name:?}")))?;

    let mut fields = Fields::new();
    if let Some(raw) = value.get("fields").and_then(Value::as_object) {
        for (field, raw_value) in raw {
            match decode_value(raw_value) {
                Some(decoded) => {
                    fields.insert(field.clone(), decoded);
                }
                None => log::debug!("document {id}: ignoring field {field} of unsupported type"),
            }
        }
    }
    Ok(Document {
        id: id.to_string(),
        fields,
    })
}

fn encode_predicate(predicate: &Predicate) -> Value {
    let op = match predicate.op {
        FieldOp::Equal => "EQUAL",
    };
    json!({
        "fieldFilter": {
            "field": { "fieldPath": predicate.field },
            "op": op,
            "value": encode_value(&predicate.value),
        }
    })
}

/// Body for `documents:runQuery`.
pub fn structured_query(collection: &str, predicates: &[Predicate], order_by: &OrderBy) -> Value {
    let direction = match order_by.direction {
        Direction::Ascending => "ASCENDING",
        Direction::Descending => "DESCENDING",
    };
    let mut query = json!({
        "from": [{ "collectionId": collection }],
        "orderBy": [{
            "field": { "fieldPath": order_by.field },
            "direction": direction,
        }],
    });
    let filter = match predicates {
        [] => None,
        [single] => Some(encode_predicate(single)),
        many => Some(json!({
            "compositeFilter": {
                "op": "AND",
                "filters": many.iter().map(encode_predicate).collect::<Vec<_>>(),
            }
        })),
    };
    if let Some(filter) = filter {
        query["where"] = filter;
    }
    json!({ "structuredQuery": query })
}

/// `runQuery` answers with one element per result; elements without a
/// `document` only carry progress metadata.
pub fn decode_query_response(value: &Value) -> Result<Vec<Document>, RemoteError> {
    let items = value
        .as_array()
        .ok_or_else(|| RemoteError::Decode("runQuery response is not an array".to_string()))?;
    items
        .iter()
        .filter_map(|item| item.get("document"))
        .map(decode_document)
        .collect()
}

pub fn update_mask(fields: &Fields) -> String {
    fields
        .keys()
        .map(|name| format!("updateMask.fieldPaths={name}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn decode_auth_response(value: &Value) -> Result<StoredSession, RemoteError> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Decode(format!("auth response missing {name}")))
    };
    Ok(StoredSession {
        identity: Identity {
            uid: field("localId")?,
            email: value.get("email").and_then(Value::as_str).map(str::to_string),
        },
        id_token: field("idToken")?,
        refresh_token: field("refreshToken")?,
    })
}

/// Decodes a securetoken `grant_type=refresh_token` answer. The account must
/// not change underneath a refresh.
pub fn decode_refresh_response(
    value: &Value,
    identity: &Identity,
) -> Result<StoredSession, RemoteError> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Decode(format!("refresh response missing {name}")))
    };
    let user_id = field("user_id")?;
    if user_id != identity.uid {
        return Err(RemoteError::Decode(format!(
            "refresh returned user {user_id} for session {}",
            identity.uid
        )));
    }
    Ok(StoredSession {
        identity: identity.clone(),
        id_token: field("id_token")?,
        refresh_token: field("refresh_token")?,
    })
}

/// Pulls `error.message` out of a Google API error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

pub fn status_error(status: u16, body: &str) -> RemoteError {
    let message = error_message(body);
    match status {
        // An expired or revoked ID token; 403 is a rules denial and keeps the session.
        401 => {
            log::debug!(target: crate::logging::REMOTE_TARGET, "bearer token rejected: {message}");
            RemoteError::Unauthenticated
        }
        403 => RemoteError::Auth(message),
        404 => RemoteError::NotFound(message),
        _ => RemoteError::Status { status, message },
    }
}

#[cfg(all(feature = "app", not(test)))]
async fn read_body(resp: reqwest::Response) -> Result<String, RemoteError> {
    let status = resp.status();
    log::debug!(target: REMOTE_TARGET, "{} -> {status}", resp.url().path());
    let text = resp
        .text()
        .await
        .map_err(|err| RemoteError::Transport(format!("failed to read response: {err}")))?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &text));
    }
    Ok(text)
}

#[cfg(all(feature = "app", not(test)))]
fn parse_json(text: &str) -> Result<Value, RemoteError> {
    serde_json::from_str(text).map_err(|err| RemoteError::Decode(err.to_string()))
}

/// Email/password sessions backed by Firebase Auth. The session survives
/// restarts through `session.json`.
#[cfg(all(feature = "app", not(test)))]
#[derive(Clone)]
pub struct FirebaseAuth {
    config: Arc<BackendConfig>,
    client: reqwest::Client,
    storage: Arc<Storage>,
    current: Arc<Mutex<Option<StoredSession>>>,
}

#[cfg(all(feature = "app", not(test)))]
impl FirebaseAuth {
    pub fn new(config: BackendConfig, storage: Storage) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RemoteError::Transport(format!("failed to build http client: {err}")))?;
        let restored = storage.load_session().unwrap_or_else(|err| {
            log::warn!("ignoring unreadable session file: {err}");
            None
        });
        Ok(Self {
            config: Arc::new(config),
            client,
            storage: Arc::new(storage),
            current: Arc::new(Mutex::new(restored)),
        })
    }

    pub fn id_token(&self) -> Option<String> {
        let guard = self.current.lock().expect("session poisoned");
        guard.as_ref().map(|session| session.id_token.clone())
    }

    fn remember(&self, session: Option<StoredSession>) {
        if let Err(err) = self.storage.save_session(session.as_ref()) {
            log::warn!("failed to persist session: {err}");
        }
        let mut guard = self.current.lock().expect("session poisoned");
        *guard = session;
    }

    fn forget(&self) {
        log::warn!(target: REMOTE_TARGET, "session no longer accepted, signing out");
        self.remember(None);
    }

    /// Swaps the stored refresh token for a new ID token. A refused refresh
    /// ends the session.
    pub async fn refresh(&self) -> Result<(), RemoteError> {
        let current = {
            let guard = self.current.lock().expect("session poisoned");
            guard.clone()
        };
        let session = current.ok_or(RemoteError::Unauthenticated)?;
        let url = format!(
            "{}/token?key={}",
            self.config.token_base_url.trim_end_matches('/'),
            self.config.api_key
        );
        let resp = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| RemoteError::Transport(format!("failed to read response: {err}")))?;
        if status.is_client_error() {
            log::warn!(target: REMOTE_TARGET, "token refresh refused: {}", error_message(&text));
            self.forget();
            return Err(RemoteError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }
        let refreshed = decode_refresh_response(&parse_json(&text)?, &session.identity)?;
        log::info!(target: REMOTE_TARGET, "refreshed id token uid={}", refreshed.identity.uid);
        self.remember(Some(refreshed));
        Ok(())
    }

    async fn account_request(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, RemoteError> {
        let url = format!(
            "{}/accounts:{endpoint}?key={}",
            self.config.auth_base_url.trim_end_matches('/'),
            self.config.api_key
        );
        let payload = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let resp = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| RemoteError::Transport(format!("failed to read response: {err}")))?;
        if !status.is_success() {
            // Auth endpoints answer bad credentials with 400 and a code in error.message.
            return Err(RemoteError::Auth(error_message(&text)));
        }
        let session = decode_auth_response(&parse_json(&text)?)?;
        let identity = session.identity.clone();
        self.remember(Some(session));
        Ok(identity)
    }
}

#[cfg(all(feature = "app", not(test)))]
#[async_trait]
impl SessionProvider for FirebaseAuth {
    fn current_identity(&self) -> Option<Identity> {
        let guard = self.current.lock().expect("session poisoned");
        guard.as_ref().map(|session| session.identity.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, RemoteError> {
        self.account_request("signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, RemoteError> {
        self.account_request("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.remember(None);
        Ok(())
    }
}

/// Cloud Firestore documents, authorized with the signed-in user's ID token.
#[cfg(all(feature = "app", not(test)))]
#[derive(Clone)]
pub struct FirestoreStore {
    config: Arc<BackendConfig>,
    client: reqwest::Client,
    auth: FirebaseAuth,
}

#[cfg(all(feature = "app", not(test)))]
impl FirestoreStore {
    pub fn new(config: BackendConfig, auth: FirebaseAuth) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RemoteError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            config: Arc::new(config),
            client,
            auth,
        })
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{collection}/{doc_id}", self.config.documents_url())
    }

    /// Sends with the current ID token. A rejected token is refreshed once and
    /// the request rebuilt; a second rejection ends the session.
    async fn send<F>(&self, build: F) -> Result<String, RemoteError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        match self.send_once(&build).await {
            Err(RemoteError::Unauthenticated) => {}
            other => return other,
        }
        self.auth.refresh().await?;
        let retried = self.send_once(&build).await;
        if matches!(retried, Err(RemoteError::Unauthenticated)) {
            self.auth.forget();
        }
        retried
    }

    async fn send_once<F>(&self, build: &F) -> Result<String, RemoteError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.auth.id_token().ok_or(RemoteError::Unauthenticated)?;
        let resp = build()
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| {
                log::debug!(target: REMOTE_TARGET, "request failed: {err}");
                RemoteError::Transport(err.to_string())
            })?;
        read_body(resp).await
    }
}

#[cfg(all(feature = "app", not(test)))]
#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: &OrderBy,
    ) -> Result<Vec<Document>, RemoteError> {
        let url = format!("{}:runQuery", self.config.documents_url());
        let body = structured_query(collection, predicates, order_by);
        let text = self
            .send(|| self.client.post(&url).json(&body))
            .await?;
        decode_query_response(&parse_json(&text)?)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let url = format!("{}/{collection}", self.config.documents_url());
        let body = encode_fields(&fields);
        let text = self
            .send(|| self.client.post(&url).json(&body))
            .await?;
        Ok(decode_document(&parse_json(&text)?)?.id)
    }

    async fn update_fields(
        &self,
        collection: &str,
        doc_id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError> {
        // `currentDocument.exists` turns an update of a deleted task into an error
        // instead of silently recreating it.
        let url = format!(
            "{}?{}&currentDocument.exists=true",
            self.document_url(collection, doc_id),
            update_mask(&fields)
        );
        let body = encode_fields(&fields);
        self.send(|| self.client.patch(&url).json(&body)).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), RemoteError> {
        let url = self.document_url(collection, doc_id);
        self.send(|| self.client.delete(&url)).await?;
        Ok(())
    }
}
