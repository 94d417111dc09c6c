//! Session capability consumed by the cart engine.
//!
//! The engine never reads ambient state to decide whether a shopper is signed
//! in. Callers inject a [`SessionProvider`]; a `None` session routes every
//! mutation to local-only mode and blocks checkout.

use std::sync::{Arc, PoisonError, RwLock};

use cartwheel_core::UserId;
use secrecy::SecretString;

use crate::config::{ConfigError, get_optional_env};

/// An authenticated shopper.
///
/// The token is a `SecretString`, so `Debug` output redacts it.
#[derive(Debug, Clone)]
pub struct Session {
    /// Remote user identifier sent in mutation bodies.
    pub user_id: UserId,
    /// Bearer token for the remote cart API.
    pub token: SecretString,
}

impl Session {
    /// Create a session.
    #[must_use]
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: SecretString::from(token.into()),
        }
    }

    /// Load a session from `CART_SESSION_TOKEN` and `CART_USER_ID`.
    ///
    /// Returns `Ok(None)` when neither is set (guest mode).
    ///
    /// # Errors
    ///
    /// Returns an error if only one of the two variables is set, or the user
    /// ID is blank.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match (
            get_optional_env("CART_SESSION_TOKEN"),
            get_optional_env("CART_USER_ID"),
        ) {
            (None, None) => Ok(None),
            (Some(token), Some(user_id)) => {
                let user_id = UserId::parse(&user_id).map_err(|e| {
                    ConfigError::InvalidEnvVar("CART_USER_ID".to_string(), e.to_string())
                })?;
                Ok(Some(Self::new(user_id, token)))
            }
            (Some(_), None) => Err(ConfigError::MissingEnvVar("CART_USER_ID".to_string())),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar(
                "CART_SESSION_TOKEN".to_string(),
            )),
        }
    }
}

/// Supplies the current authentication state. Read-only from the engine's side.
pub trait SessionProvider {
    /// The current session, or `None` for a guest.
    fn current(&self) -> Option<Session>;
}

/// A provider that is never signed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl SessionProvider for Anonymous {
    fn current(&self) -> Option<Session> {
        None
    }
}

/// A provider whose session can be swapped by the host application.
///
/// Clones share state, so the UI layer can keep one handle and sign the
/// shopper in or out while the engine holds another.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SharedSession {
    /// Create a provider that starts signed in.
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// Replace the current session.
    pub fn sign_in(&self, session: Session) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Drop the current session.
    pub fn sign_out(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionProvider for SharedSession {
    fn current(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionProvider for Option<Session> {
    fn current(&self) -> Option<Session> {
        self.clone()
    }
}
