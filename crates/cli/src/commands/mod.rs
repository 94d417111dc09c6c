//! CLI command implementations.

pub mod cart;
pub mod checkout;

use cartwheel_cart::{
    CartConfig, CartEngine, CartError, ConfigError, EngineOptions, FileStore, HttpCartStore,
    RemoteError, Session,
};
use cartwheel_core::IdError;
use thiserror::Error;

/// Engine wired to the HTTP remote, the file store and the environment session.
pub type CliEngine = CartEngine<HttpCartStore, FileStore, Option<Session>>;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote cart client error: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Invalid cart key: {0}")]
    Key(#[from] IdError),

    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("Checkout rejected: {0}")]
    CheckoutRejected(String),
}

/// Build an engine from `CART_*` environment variables.
///
/// `CART_API_BASE_URL` may be left unset for guest use.
///
/// # Errors
///
/// Returns an error if configuration or the session variables are invalid.
pub fn open_engine() -> Result<CliEngine, CommandError> {
    let config = CartConfig::from_env()?;
    let session = Session::from_env()?;
    build_engine(&config, session)
}

fn build_engine(config: &CartConfig, session: Option<Session>) -> Result<CliEngine, CommandError> {
    let remote = HttpCartStore::new(config)?;
    let store = FileStore::new(&config.storage_dir);

    match (&session, &config.api_base_url) {
        (Some(session), Some(_)) => {
            tracing::debug!(user_id = %session.user_id, "Using signed-in session");
        }
        (Some(session), None) => tracing::warn!(
            user_id = %session.user_id,
            "Session configured without CART_API_BASE_URL, remote calls will fail"
        ),
        (None, _) => tracing::debug!("No session configured, running as guest"),
    }

    Ok(CartEngine::new(
        remote,
        store,
        session,
        EngineOptions::from(config),
    ))
}
