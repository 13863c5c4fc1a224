//! Error types for task list operations.

use std::fmt;

use thiserror::Error;

use crate::backend::RemoteError;
use crate::storage::StorageError;

/// The remote call an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    ToggleComplete,
    Delete,
    Edit,
    Create,
    SignIn,
    SignUp,
    SignOut,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load tasks",
            Operation::ToggleComplete => "update task",
            Operation::Delete => "delete task",
            Operation::Edit => "edit task",
            Operation::Create => "add task",
            Operation::SignIn => "sign in",
            Operation::SignUp => "sign up",
            Operation::SignOut => "sign out",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// No active session; the caller should send the user to sign in.
    #[error("sign in please")]
    NotAuthenticated,

    #[error("failed to {operation}: {source}")]
    RemoteOperationFailed {
        operation: Operation,
        #[source]
        source: RemoteError,
    },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("backend setup failed: {0}")]
    Setup(RemoteError),
}

impl Error {
    /// A backend that no longer accepts the session is reported as
    /// `NotAuthenticated` so the caller sends the user back to sign in.
    pub fn remote(operation: Operation, source: RemoteError) -> Self {
        match source {
            RemoteError::Unauthenticated => Error::NotAuthenticated,
            source => Error::RemoteOperationFailed { operation, source },
        }
    }

    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Error::NotAuthenticated)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
