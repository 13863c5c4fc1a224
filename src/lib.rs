//! Datebook: a date-scoped task list kept in step with a hosted document store.
//!
//! Screens hold a [`TaskListController`] for their scope (one calendar day, or
//! every task), call [`TaskListController::on_focus`] when they become active
//! and render [`TaskListController::visible_tasks`] or the snapshots from
//! [`TaskListController::subscribe`].

pub mod auth;
pub mod backend;
pub mod controller;
pub mod draft;
pub mod error;
pub mod events;
pub mod firebase;
pub mod logging;
pub mod memory;
pub mod models;
pub mod state;
pub mod storage;

pub use auth::AuthFlow;
pub use backend::{DocumentStore, RemoteError, SessionProvider};
pub use controller::{CreateOutcome, TaskListController};
pub use draft::TaskDraft;
pub use error::{Error, Result};
pub use events::StatePayload;
pub use models::{Identity, Scope, Task, VisibilityFilter};

#[cfg(all(feature = "app", not(test)))]
use std::path::PathBuf;
#[cfg(all(feature = "app", not(test)))]
use std::sync::Arc;

#[cfg(all(feature = "app", not(test)))]
use crate::firebase::{FirebaseAuth, FirestoreStore};
#[cfg(all(feature = "app", not(test)))]
use crate::storage::Storage;

/// The hosted backend wired up from the app data directory.
#[cfg(all(feature = "app", not(test)))]
pub struct Backend {
    auth: Arc<FirebaseAuth>,
    store: Arc<FirestoreStore>,
}

#[cfg(all(feature = "app", not(test)))]
impl Backend {
    pub fn auth_flow(&self) -> AuthFlow<FirebaseAuth> {
        AuthFlow::new(Arc::clone(&self.auth))
    }

    pub fn day_view(
        &self,
        date: chrono::NaiveDate,
    ) -> TaskListController<FirebaseAuth, FirestoreStore> {
        TaskListController::for_day(Arc::clone(&self.auth), Arc::clone(&self.store), date)
    }

    pub fn all_tasks_view(&self) -> TaskListController<FirebaseAuth, FirestoreStore> {
        TaskListController::all_tasks(Arc::clone(&self.auth), Arc::clone(&self.store))
    }
}

/// Initializes logging, reads `backend.json` and restores any saved session.
#[cfg(all(feature = "app", not(test)))]
pub fn connect(app_data_dir: PathBuf) -> Result<Backend> {
    if let Err(err) = logging::init_logging(&app_data_dir) {
        eprintln!("failed to initialize logging: {err}");
    }
    let storage = Storage::new(app_data_dir);
    storage.ensure_dirs()?;
    let config = storage.load_backend_config()?;
    log::info!("connecting project={}", config.project_id);

    let auth = FirebaseAuth::new(config.clone(), storage).map_err(Error::Setup)?;
    let store = FirestoreStore::new(config, auth.clone()).map_err(Error::Setup)?;
    Ok(Backend {
        auth: Arc::new(auth),
        store: Arc::new(store),
    })
}
