use std::sync::Arc;

use crate::backend::SessionProvider;
use crate::error::{Error, Operation, Result};
use crate::models::Identity;

/// Sign-in, sign-up and sign-out as the auth screens drive them.
pub struct AuthFlow<S> {
    session: Arc<S>,
}

impl<S> Clone for AuthFlow<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<S: SessionProvider> AuthFlow<S> {
    pub fn new(session: Arc<S>) -> Self {
        Self { session }
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.current_identity()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim();
        let identity = self
            .session
            .sign_in(email, password)
            .await
            .map_err(|err| {
                log::warn!("sign in failed email={email}: {err}");
                Error::remote(Operation::SignIn, err)
            })?;
        log::info!("signed in uid={}", identity.uid);
        Ok(identity)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim();
        let identity = self
            .session
            .sign_up(email, password)
            .await
            .map_err(|err| {
                log::warn!("sign up failed email={email}: {err}");
                Error::remote(Operation::SignUp, err)
            })?;
        log::info!("account created uid={}", identity.uid);
        Ok(identity)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.session.sign_out().await.map_err(|err| {
            log::error!("sign out failed: {err}");
            Error::remote(Operation::SignOut, err)
        })?;
        log::info!("signed out");
        Ok(())
    }
}
