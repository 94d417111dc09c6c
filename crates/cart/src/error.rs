//! Errors the cart engine raises to its callers.
//!
//! Only two conditions are raised: an item without identity, and checkout
//! without a session. Remote failures are never raised from the engine; they
//! are reported through result fields ([`crate::RemoteOutcome`],
//! [`crate::SyncReport`], [`crate::CheckoutValidation`]).

use cartwheel_core::IdError;
use thiserror::Error;

/// Errors raised by [`crate::CartEngine`].
#[derive(Debug, Error)]
pub enum CartError {
    /// The item has no usable product identity and could never be addressed.
    #[error("Invalid item: {0}")]
    InvalidItem(#[from] IdError),

    /// Checkout needs a signed-in shopper so the remote total can be charged.
    #[error("Checkout blocked: {0}")]
    CheckoutBlocked(String),
}

impl CartError {
    /// Whether the caller should send the shopper to sign in.
    #[must_use]
    pub const fn requires_sign_in(&self) -> bool {
        matches!(self, Self::CheckoutBlocked(_))
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
