//! Remote authoritative cart store.
//!
//! # Architecture
//!
//! - [`RemoteCartStore`] is the capability the engine depends on
//! - [`HttpCartStore`] implements it over HTTP+JSON with `reqwest`
//! - Loose backend JSON is decoded by [`wire`] and flattened into
//!   [`LineItem`]s by [`normalize`]; nothing else sees the raw shapes
//! - No caching: every `fetch_cart` is a fresh read
//!
//! # Endpoints
//!
//! - `GET /cart`
//! - `POST /cart/add`
//! - `POST /cart/remove`
//! - `POST /cart/update`
//! - `POST /cart/clear`

mod http;
pub mod normalize;
pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use cartwheel_core::{CartKey, LineItem, VariantAttributes};
use rust_decimal::Decimal;
use thiserror::Error;

pub use http::HttpCartStore;

use crate::session::Session;

/// Errors that can occur when talking to the remote cart store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// No API base URL was configured.
    #[error("No remote cart API configured (set CART_API_BASE_URL)")]
    NotConfigured,

    /// Token missing, expired or rejected.
    #[error("Unauthorized: remote cart rejected the session token")]
    Unauthorized,

    /// Rate limited by the cart API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Non-success status with a truncated body.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First 200 characters of the response body.
        body: String,
    },

    /// The call did not complete in time.
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// A line to add remotely, as observed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLine {
    /// Composite identity.
    pub key: CartKey,
    /// Quantity delta.
    pub quantity: u32,
    /// Effective unit price the shopper saw.
    pub unit_price: Decimal,
    /// Variant dimensions.
    pub attributes: VariantAttributes,
    /// Image the shopper saw.
    pub image_url: Option<String>,
}

impl AddLine {
    /// Build an add request for `quantity` more units of `item`.
    #[must_use]
    pub fn from_item(item: &LineItem, quantity: u32) -> Self {
        Self {
            key: item.key(),
            quantity,
            unit_price: item.effective_price(),
            attributes: item.attributes.clone(),
            image_url: item.image_url.clone(),
        }
    }
}

/// The remote authoritative cart.
///
/// Every call carries the caller's session; implementations never cache.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Read the full remote cart, normalized into line items.
    async fn fetch_cart(&self, session: &Session) -> Result<Vec<LineItem>, RemoteError>;

    /// Add units of a line.
    async fn add_line(&self, session: &Session, line: &AddLine) -> Result<(), RemoteError>;

    /// Remove a line entirely.
    async fn remove_line(&self, session: &Session, key: &CartKey) -> Result<(), RemoteError>;

    /// Set the quantity of a line.
    async fn update_quantity(
        &self,
        session: &Session,
        key: &CartKey,
        quantity: u32,
    ) -> Result<(), RemoteError>;

    /// Remove every line.
    async fn clear_cart(&self, session: &Session) -> Result<(), RemoteError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartwheel_core::ItemInput;

    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = RemoteError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = RemoteError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_timeout_error() {
        let err = RemoteError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Timed out after 1500ms");
    }

    #[test]
    fn test_add_line_uses_effective_price() {
        let item = ItemInput::new("shirt", "Shirt", Decimal::new(150, 0))
            .with_variant("RED-L")
            .with_sale_price(Decimal::new(120, 0))
            .with_image("https://cdn.example/red.jpg")
            .into_line_item(5)
            .unwrap();
        let line = AddLine::from_item(&item, 1);
        assert_eq!(line.quantity, 1);
        assert_eq!(line.unit_price, Decimal::new(120, 0));
        assert_eq!(line.key, item.key());
        assert_eq!(line.image_url.as_deref(), Some("https://cdn.example/red.jpg"));
    }
}
