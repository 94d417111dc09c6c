//! Integration test support for Cartwheel.
//!
//! Provides [`MockCartServer`], an in-process axum server that speaks the
//! remote cart API on an ephemeral port. Tests point the real
//! [`cartwheel_cart::HttpCartStore`] at it and steer its behavior (server-side
//! price changes, outages, latency, hand-written JSON responses).
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```
//!
//! # Mock API
//!
//! Served under `/api/`:
//!
//! - `GET /api/cart` returns `{ success, cart: { items } }`, with items in the
//!   populated-product shape (`product._id`, `variantSku`, string prices)
//! - `POST /api/cart/{add,remove,update,clear}` mutate the in-memory cart
//!
//! Every endpoint requires `Authorization: Bearer` [`TEST_TOKEN`].

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cartwheel_cart::remote::wire::{AddRequest, ClearRequest, RemoveRequest, UpdateRequest};
use cartwheel_cart::{CartConfig, Session};
use cartwheel_core::UserId;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use url::Url;

/// Bearer token the mock server accepts.
pub const TEST_TOKEN: &str = "tok_integration";

/// User the test session is issued for.
pub const TEST_USER: &str = "user-42";

/// Body returned while the server is failing.
pub const FAILURE_BODY: &str = "backend exploded";

/// One line of the mock remote cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLine {
    pub product_id: String,
    pub sku: Option<String>,
    pub title: String,
    pub price: Decimal,
    pub qty: u32,
    pub image_url: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl MockLine {
    /// A line with the server's generic title for `product_id`.
    #[must_use]
    pub fn new(product_id: &str, sku: Option<&str>, price: Decimal, qty: u32) -> Self {
        Self {
            product_id: product_id.to_owned(),
            sku: sku.map(str::to_owned),
            title: generic_title(product_id),
            price,
            qty,
            image_url: None,
            attributes: BTreeMap::new(),
        }
    }

    fn render(&self) -> Value {
        json!({
            "product": { "_id": self.product_id, "title": self.title },
            "variantSku": self.sku,
            "price": self.price.to_string(),
            "qty": self.qty,
            "imageUrl": self.image_url,
            "variantAttributes": self.attributes,
        })
    }
}

fn generic_title(product_id: &str) -> String {
    format!("Product {product_id}")
}

#[derive(Debug, Default)]
struct MockInner {
    lines: Vec<MockLine>,
    price_overrides: HashMap<String, Decimal>,
    raw_cart: Option<Value>,
    failure: Option<StatusCode>,
    delay: Option<Duration>,
    requests: Vec<String>,
}

/// Shared state of the mock server.
#[derive(Debug, Clone, Default)]
pub struct MockState {
    inner: Arc<Mutex<MockInner>>,
}

impl MockState {
    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// MockCartServer
// =============================================================================

/// A running mock remote cart server. Aborted on drop.
pub struct MockCartServer {
    base_url: Url,
    state: MockState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockCartServer {
    /// Start a server on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn spawn() -> Self {
        let state = MockState::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has no address");
        let base_url =
            Url::parse(&format!("http://{addr}/api/")).expect("mock base URL is valid");

        let app = router(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock cart server failed");
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    /// Base URL of the API.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Client configuration pointing at this server with a short timeout.
    #[must_use]
    pub fn config(&self) -> CartConfig {
        let mut config = CartConfig::new(self.base_url.clone());
        config.request_timeout = Duration::from_secs(2);
        config.storage_dir = temp_storage_dir();
        config
    }

    /// A session the server accepts.
    ///
    /// # Panics
    ///
    /// Never; the test user ID is a constant.
    #[must_use]
    pub fn session() -> Session {
        Session::new(
            UserId::parse(TEST_USER).expect("test user ID is valid"),
            TEST_TOKEN,
        )
    }

    /// Current remote lines.
    #[must_use]
    pub fn lines(&self) -> Vec<MockLine> {
        self.state.lock().lines.clone()
    }

    /// Current remote total.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.state
            .lock()
            .lines
            .iter()
            .map(|line| line.price * Decimal::from(line.qty))
            .sum()
    }

    /// Replace the remote cart, as another device would.
    pub fn set_lines(&self, lines: Vec<MockLine>) {
        self.state.lock().lines = lines;
    }

    /// Change a product's server-side price, for existing and future lines.
    pub fn set_price(&self, product_id: &str, price: Decimal) {
        let mut inner = self.state.lock();
        inner.price_overrides.insert(product_id.to_owned(), price);
        for line in inner.lines.iter_mut().filter(|l| l.product_id == product_id) {
            line.price = price;
        }
    }

    /// Serve `body` verbatim from `GET /cart`.
    pub fn set_raw_cart(&self, body: Value) {
        self.state.lock().raw_cart = Some(body);
    }

    /// Answer every request with `status`.
    pub fn fail_with(&self, status: StatusCode) {
        self.state.lock().failure = Some(status);
    }

    /// Stop failing.
    pub fn recover(&self) {
        self.state.lock().failure = None;
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Requests received so far, as `METHOD /path`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }
}

impl Drop for MockCartServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A fresh directory under the system temp dir for a file-backed local store.
#[must_use]
pub fn temp_storage_dir() -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    std::env::temp_dir().join(format!(
        "cartwheel-it-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

// =============================================================================
// Routes
// =============================================================================

/// Router for the mock API.
pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/api/cart", get(get_cart))
        .route("/api/cart/add", post(add))
        .route("/api/cart/remove", post(remove))
        .route("/api/cart/update", post(update))
        .route("/api/cart/clear", post(clear))
        .with_state(state)
}

/// Record the request, apply latency, then enforce auth and failure mode.
async fn admit(state: &MockState, headers: &HeaderMap, request: &str) -> Result<(), Response> {
    let (delay, failure) = {
        let mut inner = state.lock();
        inner.requests.push(request.to_owned());
        (inner.delay, inner.failure)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let expected = format!("Bearer {TEST_TOKEN}");
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Unauthorized" })),
        )
            .into_response());
    }

    if let Some(status) = failure {
        return Err((status, FAILURE_BODY).into_response());
    }
    Ok(())
}

fn ok() -> Response {
    Json(json!({ "success": true })).into_response()
}

async fn get_cart(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(response) = admit(&state, &headers, "GET /cart").await {
        return response;
    }
    let body = {
        let inner = state.lock();
        inner.raw_cart.clone().unwrap_or_else(|| {
            let items: Vec<Value> = inner.lines.iter().map(MockLine::render).collect();
            json!({ "success": true, "cart": { "items": items } })
        })
    };
    Json(body).into_response()
}

async fn add(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<AddRequest>,
) -> Response {
    if let Err(response) = admit(&state, &headers, "POST /cart/add").await {
        return response;
    }
    let mut inner = state.lock();
    for item in body.items {
        let price = inner
            .price_overrides
            .get(&item.product_id)
            .copied()
            .unwrap_or(item.unit_price);
        if let Some(line) = inner
            .lines
            .iter_mut()
            .find(|l| l.product_id == item.product_id && l.sku == item.sku)
        {
            line.qty += item.qty;
            line.price = price;
        } else {
            inner.lines.push(MockLine {
                title: generic_title(&item.product_id),
                product_id: item.product_id,
                sku: item.sku,
                price,
                qty: item.qty,
                image_url: item.image_url,
                attributes: item.variant_attributes.unwrap_or_default(),
            });
        }
    }
    drop(inner);
    ok()
}

async fn remove(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<RemoveRequest>,
) -> Response {
    if let Err(response) = admit(&state, &headers, "POST /cart/remove").await {
        return response;
    }
    state
        .lock()
        .lines
        .retain(|l| !(l.product_id == body.product_id && l.sku == body.sku));
    ok()
}

async fn update(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<UpdateRequest>,
) -> Response {
    if let Err(response) = admit(&state, &headers, "POST /cart/update").await {
        return response;
    }
    let mut inner = state.lock();
    if body.quantity == 0 {
        inner
            .lines
            .retain(|l| !(l.product_id == body.product_id && l.sku == body.sku));
    } else if let Some(line) = inner
        .lines
        .iter_mut()
        .find(|l| l.product_id == body.product_id && l.sku == body.sku)
    {
        line.qty = body.quantity;
    }
    drop(inner);
    ok()
}

async fn clear(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(_body): Json<ClearRequest>,
) -> Response {
    if let Err(response) = admit(&state, &headers, "POST /cart/clear").await {
        return response;
    }
    state.lock().lines.clear();
    ok()
}
