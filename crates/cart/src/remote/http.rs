//! HTTP+JSON implementation of the remote cart store.
//!
//! Uses `reqwest` with a per-request timeout and bearer authentication.
//! Responses are read as text first so failures can be logged with context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartwheel_core::{CartKey, LineItem};
use reqwest::header::{CACHE_CONTROL, RETRY_AFTER};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use super::normalize::normalize_cart;
use super::wire::{AddItem, AddRequest, CartEnvelope, ClearRequest, RemoveRequest, UpdateRequest};
use super::{AddLine, RemoteCartStore, RemoteError};
use crate::config::CartConfig;
use crate::session::Session;

/// Characters of a failing response body kept for logs and errors.
const ERROR_BODY_CHARS: usize = 200;

// =============================================================================
// HttpCartStore
// =============================================================================

/// Client for the remote cart API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpCartStore {
    inner: Arc<HttpCartStoreInner>,
}

struct HttpCartStoreInner {
    client: reqwest::Client,
    base_url: Option<Url>,
    timeout: Duration,
}

impl HttpCartStore {
    /// Create a client from configuration.
    ///
    /// Without a base URL every call fails with [`RemoteError::NotConfigured`].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CartConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCartStoreInner {
                client,
                base_url: config.api_base_url.clone(),
                timeout: config.request_timeout,
            }),
        })
    }

    /// Base URL endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.inner.base_url.as_ref()
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        let base = self.base_url().ok_or(RemoteError::NotConfigured)?;
        Ok(base.join(path)?)
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, RemoteError> {
        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized);
        }

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        let body = response.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Cart API returned non-success status"
            );
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(body)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        session: &Session,
        path: &str,
        body: &B,
    ) -> Result<(), RemoteError> {
        let request = self
            .inner
            .client
            .post(self.endpoint(path)?)
            .bearer_auth(session.token.expose_secret())
            .json(body);
        self.execute(request).await?;
        Ok(())
    }

    fn map_transport(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.inner.timeout)
        } else {
            RemoteError::Http(e)
        }
    }
}

fn sku(key: &CartKey) -> Option<String> {
    key.variant.as_ref().map(|v| v.as_str().to_owned())
}

#[async_trait]
impl RemoteCartStore for HttpCartStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn fetch_cart(&self, session: &Session) -> Result<Vec<LineItem>, RemoteError> {
        let request = self
            .inner
            .client
            .get(self.endpoint("cart")?)
            .bearer_auth(session.token.expose_secret())
            .header(CACHE_CONTROL, "no-cache");
        let body = self.execute(request).await?;

        let envelope: CartEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %body.chars().take(500).collect::<String>(),
                    "Failed to parse cart response"
                );
                return Err(RemoteError::Parse(e));
            }
        };

        let items = normalize_cart(envelope.into_items());
        debug!(lines = items.len(), "Fetched remote cart");
        Ok(items)
    }

    #[instrument(skip(self, session, line), fields(user_id = %session.user_id, key = %line.key))]
    async fn add_line(&self, session: &Session, line: &AddLine) -> Result<(), RemoteError> {
        let body = AddRequest {
            user_id: session.user_id.to_string(),
            items: vec![AddItem {
                product_id: line.key.product_id.to_string(),
                sku: sku(&line.key),
                qty: line.quantity,
                unit_price: line.unit_price,
                variant_attributes: (!line.attributes.is_empty())
                    .then(|| line.attributes.clone()),
                image_url: line.image_url.clone(),
            }],
        };
        self.post(session, "cart/add", &body).await
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id, key = %key))]
    async fn remove_line(&self, session: &Session, key: &CartKey) -> Result<(), RemoteError> {
        let body = RemoveRequest {
            user_id: session.user_id.to_string(),
            product_id: key.product_id.to_string(),
            sku: sku(key),
        };
        self.post(session, "cart/remove", &body).await
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id, key = %key))]
    async fn update_quantity(
        &self,
        session: &Session,
        key: &CartKey,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let body = UpdateRequest {
            user_id: session.user_id.to_string(),
            product_id: key.product_id.to_string(),
            sku: sku(key),
            quantity,
        };
        self.post(session, "cart/update", &body).await
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn clear_cart(&self, session: &Session) -> Result<(), RemoteError> {
        let body = ClearRequest {
            user_id: session.user_id.to_string(),
        };
        self.post(session, "cart/clear", &body).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpCartStore {
        HttpCartStore::new(&CartConfig::new(Url::parse(base).unwrap())).unwrap()
    }

    #[test]
    fn test_endpoints_join_under_base_path() {
        let store = store("https://api.example.com/v2");
        assert_eq!(
            store.endpoint("cart").unwrap().as_str(),
            "https://api.example.com/v2/cart"
        );
        assert_eq!(
            store.endpoint("cart/update").unwrap().as_str(),
            "https://api.example.com/v2/cart/update"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_store_fails_every_call() {
        let store = HttpCartStore::new(&CartConfig::local_only()).unwrap();
        let session = Session::new(cartwheel_core::UserId::parse("u-1").unwrap(), "tok");
        let key = CartKey::parse("mug", None).unwrap();

        assert!(store.base_url().is_none());
        assert!(matches!(store.endpoint("cart"), Err(RemoteError::NotConfigured)));
        assert!(matches!(
            store.fetch_cart(&session).await,
            Err(RemoteError::NotConfigured)
        ));
        assert!(matches!(
            store.remove_line(&session, &key).await,
            Err(RemoteError::NotConfigured)
        ));
    }

    #[test]
    fn test_sku_from_key() {
        let plain = CartKey::parse("mug", None).unwrap();
        let red = CartKey::parse("shirt", Some("RED-L")).unwrap();
        assert_eq!(sku(&plain), None);
        assert_eq!(sku(&red).as_deref(), Some("RED-L"));
    }
}
