//! Cartwheel cart engine.
//!
//! Keeps one logical shopping cart consistent across an in-memory view, a
//! durable local store and an authoritative remote cart service.
//!
//! # Architecture
//!
//! - [`CartEngine`] owns the cart and serializes mutations through `&mut self`
//! - [`LocalStore`] is a passive mirror written after every change
//! - [`RemoteCartStore`] is the authority; [`HttpCartStore`] talks to it over HTTP
//! - [`SessionProvider`] decides per call whether the remote is used at all
//!
//! # Example
//!
//! ```rust,ignore
//! use cartwheel_cart::{CartConfig, CartEngine, EngineOptions, FileStore, HttpCartStore, Session};
//!
//! let config = CartConfig::from_env()?;
//! let remote = HttpCartStore::new(&config)?;
//! let store = FileStore::new(&config.storage_dir);
//! let session = Session::from_env()?;
//! let mut engine = CartEngine::new(remote, store, session, EngineOptions::from(&config));
//!
//! let checkout = engine.validate_for_checkout().await?;
//! if checkout.valid {
//!     // charge checkout.backend_total
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod engine;
pub mod error;
pub mod local;
pub mod remote;
pub mod session;

pub use config::{CartConfig, ConfigError};
pub use engine::{
    CartEngine, CheckoutIssue, CheckoutValidation, EngineOptions, MutationOutcome, RemoteOutcome,
    SyncReport,
};
pub use error::{CartError, Result};
pub use local::{FileStore, LocalStore, MemoryStore, StoreError};
pub use remote::{AddLine, HttpCartStore, RemoteCartStore, RemoteError};
pub use session::{Anonymous, Session, SessionProvider, SharedSession};
