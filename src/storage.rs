use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{BackendConfig, SessionFile, StoredSession};

const BACKEND_FILE: &str = "backend.json";
const SESSION_FILE: &str = "session.json";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON files under the app data directory.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn load_backend_config(&self) -> Result<BackendConfig, StorageError> {
        let config: BackendConfig = self.load_json(self.root.join(BACKEND_FILE))?;
        Ok(config.apply_env_overrides())
    }

    pub fn save_backend_config(&self, config: &BackendConfig) -> Result<(), StorageError> {
        self.write_atomic(self.root.join(BACKEND_FILE), config)
    }

    /// A missing session file means nobody is signed in.
    pub fn load_session(&self) -> Result<Option<StoredSession>, StorageError> {
        let path = self.root.join(SESSION_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let file: SessionFile = self.load_json(path)?;
        Ok(file.session)
    }

    pub fn save_session(&self, session: Option<&StoredSession>) -> Result<(), StorageError> {
        let file = SessionFile {
            schema_version: SCHEMA_VERSION,
            session: session.cloned(),
        };
        self.write_atomic(self.root.join(SESSION_FILE), &file)
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}
