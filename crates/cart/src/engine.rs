//! Cart reconciliation engine.
//!
//! The engine is the single owner of the in-memory cart. It keeps that cart in
//! step with two mirrors:
//!
//! - the durable [`LocalStore`], written after every local mutation and read
//!   once at construction
//! - the authoritative [`RemoteCartStore`], reachable only with a session
//!
//! Mutations (`add_item`, `remove_item`, `update_quantity`, `clear`) are
//! local-first: the local cart is always updated, then the remote call is
//! awaited and its outcome only lands in [`MutationOutcome::remote`]. A guest
//! or a flaky network never blocks shopping.
//!
//! [`CartEngine::validate_for_checkout`] is the one strict operation. It
//! re-reads the remote cart, compares counts and totals, overwrites the local
//! cart with the remote one, and only reports `valid` when the amount about to
//! be charged matches what the shopper saw.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use cartwheel_core::{CartKey, CartSnapshot, ItemInput, LineItem};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::config::CartConfig;
use crate::error::{CartError, Result};
use crate::local::{LocalStore, load_cart, save_cart};
use crate::remote::{AddLine, RemoteCartStore, RemoteError};
use crate::session::SessionProvider;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const SIGN_IN_TO_CHECKOUT: &str = "Please sign in to complete your purchase.";
const TOTAL_OUT_OF_RANGE: &str = "remote cart total is out of range";

// =============================================================================
// Options & results
// =============================================================================

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound on every remote call.
    pub request_timeout: Duration,
    /// Absolute difference between local and remote totals accepted at checkout.
    pub total_tolerance: Decimal,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            total_tolerance: Decimal::ONE,
        }
    }
}

impl From<&CartConfig> for EngineOptions {
    fn from(config: &CartConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            total_tolerance: config.total_tolerance,
        }
    }
}

/// What happened to the remote half of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// No session; the mutation was local only.
    Skipped,
    /// The remote store accepted the change.
    Applied,
    /// The remote call failed; the local change stands.
    Failed(String),
}

impl RemoteOutcome {
    /// Whether the remote call failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of a cart mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Cart after the local update.
    pub snapshot: CartSnapshot,
    /// Outcome of the best-effort remote call.
    pub remote: RemoteOutcome,
}

/// Result of [`CartEngine::sync_with_remote`].
///
/// On failure `total` and `items` are the unchanged local cart; a failed sync
/// never means "the cart is now empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the local cart now mirrors the remote cart.
    pub success: bool,
    /// Cart total after the operation.
    pub total: Decimal,
    /// Cart lines after the operation.
    pub items: Vec<LineItem>,
    /// Explanation when `success` is false.
    pub message: Option<String>,
}

impl SyncReport {
    fn synced(cart: &CartSnapshot) -> Self {
        Self {
            success: true,
            total: cart.total(),
            items: cart.items().to_vec(),
            message: None,
        }
    }

    fn unsynced(cart: &CartSnapshot, message: String) -> Self {
        Self {
            success: false,
            total: cart.total(),
            items: cart.items().to_vec(),
            message: Some(message),
        }
    }
}

/// Why checkout validation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutIssue {
    /// Unit counts differ; prices were not compared.
    CountMismatch {
        /// Units in the local cart.
        local: u64,
        /// Units in the remote cart.
        remote: u64,
    },
    /// Totals differ by more than the tolerance.
    TotalMismatch {
        /// Local total.
        local: Decimal,
        /// Remote total.
        remote: Decimal,
    },
    /// The remote cart could not be read; checkout fails closed.
    RemoteUnavailable(String),
}

impl fmt::Display for CheckoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch { local, remote } => write!(
                f,
                "Your cart changed: it now holds {remote} item(s) instead of {local}. \
                 Please review your cart before paying."
            ),
            Self::TotalMismatch { local, remote } => write!(
                f,
                "Your cart total changed from {local} to {remote}. \
                 Please review your cart before paying."
            ),
            Self::RemoteUnavailable(reason) => write!(
                f,
                "We could not confirm your cart right now ({reason}). Please try again."
            ),
        }
    }
}

/// Result of [`CartEngine::validate_for_checkout`].
///
/// `valid == true` is the only signal that payment may proceed, and
/// `backend_total` is then the amount to charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutValidation {
    /// Whether payment may proceed.
    pub valid: bool,
    /// Remote total, when the remote cart could be read.
    pub backend_total: Option<Decimal>,
    /// Local total before validation.
    pub frontend_total: Decimal,
    /// User-facing explanation when invalid.
    pub message: Option<String>,
    /// Machine-readable reason when invalid.
    pub issue: Option<CheckoutIssue>,
}

impl CheckoutValidation {
    fn passed(backend_total: Decimal, frontend_total: Decimal) -> Self {
        Self {
            valid: true,
            backend_total: Some(backend_total),
            frontend_total,
            message: None,
            issue: None,
        }
    }

    fn failed(
        backend_total: Option<Decimal>,
        frontend_total: Decimal,
        issue: CheckoutIssue,
    ) -> Self {
        Self {
            valid: false,
            backend_total,
            frontend_total,
            message: Some(issue.to_string()),
            issue: Some(issue),
        }
    }
}

// =============================================================================
// CartEngine
// =============================================================================

/// Maintains one logical cart across a local and a remote store.
///
/// Mutating methods take `&mut self`, so calls are serialized by ownership;
/// remote calls are awaited one at a time.
pub struct CartEngine<R, S, P> {
    remote: R,
    store: S,
    session: P,
    cart: CartSnapshot,
    options: EngineOptions,
}

impl<R, S, P> CartEngine<R, S, P>
where
    R: RemoteCartStore,
    S: LocalStore,
    P: SessionProvider,
{
    /// Create an engine, restoring the cart persisted in `store`.
    pub fn new(remote: R, store: S, session: P, options: EngineOptions) -> Self {
        let cart = load_cart(&store);
        debug!(lines = cart.len(), "Restored local cart");
        Self {
            remote,
            store,
            session,
            cart,
            options,
        }
    }

    /// The current cart.
    #[must_use]
    pub const fn snapshot(&self) -> &CartSnapshot {
        &self.cart
    }

    /// The current cart lines.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        self.cart.items()
    }

    /// Sum of effective unit price times quantity. No I/O.
    #[must_use]
    pub fn compute_total(&self) -> Decimal {
        self.cart.total()
    }

    /// Units in the cart.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.cart.item_count()
    }

    /// Whether a session is currently present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.current().is_some()
    }

    /// Add `quantity` units of an item (zero is treated as one).
    ///
    /// Adding an existing product/variant increments its quantity and refreshes
    /// its name, image and prices from `input`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidItem`] if `input` has no product ID; the cart
    /// is left untouched.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add_item(&mut self, input: ItemInput, quantity: u32) -> Result<MutationOutcome> {
        let quantity = quantity.max(1);
        let item = input.into_line_item(quantity)?;
        let line = AddLine::from_item(&item, quantity);

        self.cart.upsert(item);
        self.persist();
        debug!(key = %line.key, quantity, "Added item locally");

        let remote = match self.session.current() {
            Some(session) => {
                best_effort(
                    "add",
                    self.options.request_timeout,
                    self.remote.add_line(&session, &line),
                )
                .await
            }
            None => RemoteOutcome::Skipped,
        };
        Ok(self.outcome(remote))
    }

    /// Remove a line. Removing a missing key is a no-op.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn remove_item(&mut self, key: &CartKey) -> MutationOutcome {
        if self.cart.remove(key).is_some() {
            self.persist();
            debug!("Removed item locally");
        }

        let remote = match self.session.current() {
            Some(session) => {
                best_effort(
                    "remove",
                    self.options.request_timeout,
                    self.remote.remove_line(&session, key),
                )
                .await
            }
            None => RemoteOutcome::Skipped,
        };
        self.outcome(remote)
    }

    /// Set a line's quantity. Zero or negative removes the line.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn update_quantity(&mut self, key: &CartKey, quantity: i64) -> MutationOutcome {
        if quantity <= 0 {
            return self.remove_item(key).await;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);

        if self.cart.set_quantity(key, quantity) {
            self.persist();
            debug!(quantity, "Updated quantity locally");
        }

        let remote = match self.session.current() {
            Some(session) => {
                best_effort(
                    "update",
                    self.options.request_timeout,
                    self.remote.update_quantity(&session, key, quantity),
                )
                .await
            }
            None => RemoteOutcome::Skipped,
        };
        self.outcome(remote)
    }

    /// Empty the cart.
    #[instrument(skip(self))]
    pub async fn clear(&mut self) -> MutationOutcome {
        self.cart.clear();
        self.persist();

        let remote = match self.session.current() {
            Some(session) => {
                best_effort(
                    "clear",
                    self.options.request_timeout,
                    self.remote.clear_cart(&session),
                )
                .await
            }
            None => RemoteOutcome::Skipped,
        };
        self.outcome(remote)
    }

    /// Replace the local cart with the remote cart.
    ///
    /// Lines that already existed locally keep their local name and image so a
    /// chosen variant's presentation survives a generic backend response; price
    /// and quantity always come from the remote store.
    #[instrument(skip(self))]
    pub async fn sync_with_remote(&mut self) -> SyncReport {
        let Some(session) = self.session.current() else {
            return SyncReport::unsynced(
                &self.cart,
                "Not signed in; the cart is stored on this device only.".to_string(),
            );
        };

        match bounded(self.options.request_timeout, self.remote.fetch_cart(&session)).await {
            Ok(items) if checked_total(&items).is_none() => {
                warn!(lines = items.len(), "Remote cart total out of range, keeping local cart");
                SyncReport::unsynced(
                    &self.cart,
                    format!("Could not sync your cart: {TOTAL_OUT_OF_RANGE}"),
                )
            }
            Ok(items) => {
                self.reconcile(items);
                info!(lines = self.cart.len(), total = %self.cart.total(), "Cart synced");
                SyncReport::synced(&self.cart)
            }
            Err(e) => {
                warn!(error = %e, "Cart sync failed, keeping local cart");
                SyncReport::unsynced(&self.cart, format!("Could not sync your cart: {e}"))
            }
        }
    }

    /// Confirm the cart against the remote store immediately before payment.
    ///
    /// Always performs a fresh remote read. On any mismatch the local cart is
    /// overwritten with the remote one so the shopper reviews the corrected
    /// cart before retrying. A failed read fails closed.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::CheckoutBlocked`] when no session is present.
    #[instrument(skip(self))]
    pub async fn validate_for_checkout(&mut self) -> Result<CheckoutValidation> {
        let session = self
            .session
            .current()
            .ok_or_else(|| CartError::CheckoutBlocked(SIGN_IN_TO_CHECKOUT.to_string()))?;

        let frontend_total = self.cart.total();
        let frontend_count = self.cart.item_count();

        let remote_items =
            match bounded(self.options.request_timeout, self.remote.fetch_cart(&session)).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "Checkout validation could not read remote cart");
                    return Ok(CheckoutValidation::failed(
                        None,
                        frontend_total,
                        CheckoutIssue::RemoteUnavailable(e.to_string()),
                    ));
                }
            };

        let Some(backend_total) = checked_total(&remote_items) else {
            warn!(
                lines = remote_items.len(),
                "Checkout validation read a remote cart total out of range"
            );
            return Ok(CheckoutValidation::failed(
                None,
                frontend_total,
                CheckoutIssue::RemoteUnavailable(TOTAL_OUT_OF_RANGE.to_string()),
            ));
        };
        let backend_count: u64 = remote_items
            .iter()
            .map(|item| u64::from(item.quantity))
            .sum();

        if backend_count != frontend_count {
            warn!(
                local = frontend_count,
                remote = backend_count,
                "Cart item count mismatch at checkout"
            );
            self.reconcile(remote_items);
            return Ok(CheckoutValidation::failed(
                Some(backend_total),
                frontend_total,
                CheckoutIssue::CountMismatch {
                    local: frontend_count,
                    remote: backend_count,
                },
            ));
        }

        let drift = backend_total.checked_sub(frontend_total).map(|d| d.abs());
        if drift.is_none_or(|drift| drift > self.options.total_tolerance) {
            warn!(
                local = %frontend_total,
                remote = %backend_total,
                "Cart total mismatch at checkout"
            );
            self.reconcile(remote_items);
            return Ok(CheckoutValidation::failed(
                Some(backend_total),
                frontend_total,
                CheckoutIssue::TotalMismatch {
                    local: frontend_total,
                    remote: backend_total,
                },
            ));
        }

        // The remote cart is what gets charged, even when within tolerance.
        self.reconcile(remote_items);
        info!(total = %backend_total, "Cart validated for checkout");
        Ok(CheckoutValidation::passed(backend_total, frontend_total))
    }

    /// Overwrite the local cart with `remote_items`, keeping local presentation.
    fn reconcile(&mut self, remote_items: Vec<LineItem>) {
        let previous = std::mem::take(&mut self.cart);
        let rebuilt = remote_items.into_iter().map(|mut item| {
            if let Some(local) = previous.get(&item.key()) {
                if !local.name.is_empty() {
                    item.name.clone_from(&local.name);
                }
                if local.image_url.is_some() {
                    item.image_url.clone_from(&local.image_url);
                }
            }
            item
        });
        self.cart = CartSnapshot::from_items(rebuilt);
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = save_cart(&self.store, &self.cart) {
            warn!(error = %e, "Failed to persist cart locally");
        }
    }

    fn outcome(&self, remote: RemoteOutcome) -> MutationOutcome {
        MutationOutcome {
            snapshot: self.cart.clone(),
            remote,
        }
    }
}

/// Exact total of `items`, or `None` if it does not fit in a [`Decimal`].
fn checked_total(items: &[LineItem]) -> Option<Decimal> {
    items.iter().try_fold(Decimal::ZERO, |sum, item| {
        sum.checked_add(item.checked_line_total()?)
    })
}

/// Await `call`, treating a timeout exactly like a transport failure.
async fn bounded<T, F>(timeout: Duration, call: F) -> std::result::Result<T, RemoteError>
where
    F: Future<Output = std::result::Result<T, RemoteError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout(timeout)))
}

/// Run a remote mutation whose failure must not affect control flow.
async fn best_effort<F>(operation: &'static str, timeout: Duration, call: F) -> RemoteOutcome
where
    F: Future<Output = std::result::Result<(), RemoteError>>,
{
    match bounded(timeout, call).await {
        Ok(()) => RemoteOutcome::Applied,
        Err(e) => {
            warn!(operation, error = %e, "Remote cart call failed, keeping local change");
            RemoteOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use cartwheel_core::UserId;
    use rand::Rng;

    use super::*;
    use crate::local::MemoryStore;
    use crate::session::{Anonymous, Session, SharedSession};

    // -------------------------------------------------------------------------
    // Fake remote
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeState {
        cart: CartSnapshot,
        calls: Vec<String>,
        failing: bool,
        delay: Option<Duration>,
    }

    /// In-memory remote that applies mutations like the real API would.
    #[derive(Clone, Default)]
    struct FakeRemote {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeRemote {
        fn set_lines(&self, items: Vec<LineItem>) {
            self.state.lock().unwrap().cart = CartSnapshot::from_items(items);
        }

        fn set_failing(&self, failing: bool) {
            self.state.lock().unwrap().failing = failing;
        }

        fn set_delay(&self, delay: Duration) {
            self.state.lock().unwrap().delay = Some(delay);
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn remote_total(&self) -> Decimal {
            self.state.lock().unwrap().cart.total()
        }

        async fn enter(&self, call: String) -> std::result::Result<(), RemoteError> {
            let (delay, failing) = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(call);
                (state.delay, state.failing)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(RemoteError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteCartStore for FakeRemote {
        async fn fetch_cart(
            &self,
            _session: &Session,
        ) -> std::result::Result<Vec<LineItem>, RemoteError> {
            self.enter("fetch".to_string()).await?;
            Ok(self.state.lock().unwrap().cart.items().to_vec())
        }

        async fn add_line(
            &self,
            _session: &Session,
            line: &AddLine,
        ) -> std::result::Result<(), RemoteError> {
            self.enter(format!("add {} x{}", line.key, line.quantity)).await?;
            let mut input = ItemInput::new(
                line.key.product_id.as_str(),
                "Generic product",
                line.unit_price,
            );
            input.variant = line.key.variant.as_ref().map(|v| v.as_str().to_owned());
            input.image_url = Some("https://cdn.example/generic.jpg".to_string());
            let item = input.into_line_item(line.quantity).unwrap();
            self.state.lock().unwrap().cart.upsert(item);
            Ok(())
        }

        async fn remove_line(
            &self,
            _session: &Session,
            key: &CartKey,
        ) -> std::result::Result<(), RemoteError> {
            self.enter(format!("remove {key}")).await?;
            self.state.lock().unwrap().cart.remove(key);
            Ok(())
        }

        async fn update_quantity(
            &self,
            _session: &Session,
            key: &CartKey,
            quantity: u32,
        ) -> std::result::Result<(), RemoteError> {
            self.enter(format!("update {key} ={quantity}")).await?;
            self.state.lock().unwrap().cart.set_quantity(key, quantity);
            Ok(())
        }

        async fn clear_cart(&self, _session: &Session) -> std::result::Result<(), RemoteError> {
            self.enter("clear".to_string()).await?;
            self.state.lock().unwrap().cart.clear();
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn session() -> Session {
        Session::new(UserId::parse("user-1").unwrap(), "tok_test")
    }

    fn signed_in() -> (CartEngine<FakeRemote, MemoryStore, SharedSession>, FakeRemote) {
        let remote = FakeRemote::default();
        let engine = CartEngine::new(
            remote.clone(),
            MemoryStore::new(),
            SharedSession::signed_in(session()),
            EngineOptions::default(),
        );
        (engine, remote)
    }

    fn guest() -> (CartEngine<FakeRemote, MemoryStore, Anonymous>, FakeRemote) {
        let remote = FakeRemote::default();
        let engine = CartEngine::new(
            remote.clone(),
            MemoryStore::new(),
            Anonymous,
            EngineOptions::default(),
        );
        (engine, remote)
    }

    fn product_a() -> ItemInput {
        ItemInput::new("A", "Product A", Decimal::new(100, 0))
    }

    fn product_a_red() -> ItemInput {
        ItemInput::new("A", "Product A (Red, L)", Decimal::new(150, 0))
            .with_variant("Red/L")
            .with_sale_price(Decimal::new(120, 0))
            .with_image("https://cdn.example/a-red.jpg")
            .with_attribute("color", "Red")
            .with_attribute("size", "L")
    }

    fn line(product: &str, variant: Option<&str>, price: i64, qty: u32) -> LineItem {
        let mut input = ItemInput::new(product, "Remote name", Decimal::new(price, 0));
        input.variant = variant.map(str::to_owned);
        input.into_line_item(qty).unwrap()
    }

    fn key(product: &str, variant: Option<&str>) -> CartKey {
        CartKey::parse(product, variant).unwrap()
    }

    fn priced_at_max(product: &str, qty: u32) -> LineItem {
        ItemInput::new(product, "Remote name", Decimal::MAX)
            .into_line_item(qty)
            .unwrap()
    }

    // -------------------------------------------------------------------------
    // Identity & quantity
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_variants_of_same_product_are_never_merged() {
        let (mut engine, _) = guest();
        engine.add_item(product_a(), 1).await.unwrap();
        engine.add_item(product_a_red(), 1).await.unwrap();
        engine
            .add_item(product_a_red().with_variant("Blue/M"), 1)
            .await
            .unwrap();

        assert_eq!(engine.items().len(), 3);
        assert!(engine.items().iter().all(|item| item.quantity == 1));
    }

    #[tokio::test]
    async fn test_adding_same_key_increments_and_refreshes() {
        let (mut engine, _) = guest();
        engine.add_item(product_a_red(), 1).await.unwrap();
        let outcome = engine
            .add_item(
                product_a_red().with_image("https://cdn.example/a-red-v2.jpg"),
                2,
            )
            .await
            .unwrap();

        let item = &outcome.snapshot.items()[0];
        assert_eq!(outcome.snapshot.len(), 1);
        assert_eq!(item.quantity, 3);
        assert_eq!(item.image_url.as_deref(), Some("https://cdn.example/a-red-v2.jpg"));
    }

    #[tokio::test]
    async fn test_add_without_identity_fails_and_changes_nothing() {
        let (mut engine, remote) = signed_in();
        let err = engine
            .add_item(ItemInput::new("   ", "Ghost", Decimal::ONE), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, CartError::InvalidItem(_)));
        assert!(engine.snapshot().is_empty());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_quantity_zero_or_negative_removes() {
        for quantity in [0, -5] {
            let (mut engine, _) = guest();
            engine.add_item(product_a(), 2).await.unwrap();
            engine.add_item(product_a_red(), 1).await.unwrap();

            let outcome = engine.update_quantity(&key("A", None), quantity).await;

            assert!(outcome.snapshot.get(&key("A", None)).is_none());
            assert_eq!(outcome.snapshot.len(), 1);
            assert!(engine.items().iter().all(|item| item.quantity >= 1));
        }
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (mut engine, _) = signed_in();
        engine.add_item(product_a(), 1).await.unwrap();
        engine.add_item(product_a_red(), 1).await.unwrap();

        let once = engine.remove_item(&key("A", None)).await.snapshot;
        let twice = engine.remove_item(&key("A", None)).await.snapshot;

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_compute_total_for_random_carts() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let (mut engine, _) = guest();
            let mut expected = Decimal::ZERO;
            for i in 0..rng.random_range(1..8) {
                let list = Decimal::new(rng.random_range(100..50_000), 2);
                let qty: u32 = rng.random_range(1..5);
                let mut input = ItemInput::new(format!("p{i}"), "Item", list);
                let unit = if rng.random_bool(0.5) {
                    let sale = list - Decimal::new(rng.random_range(0..100), 2);
                    input = input.with_sale_price(sale);
                    sale
                } else {
                    list
                };
                expected += unit * Decimal::from(qty);
                engine.add_item(input, qty).await.unwrap();
            }
            assert_eq!(engine.compute_total(), expected);
        }
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (mut engine, remote) = signed_in();

        engine.add_item(product_a(), 1).await.unwrap();
        engine.add_item(product_a_red(), 1).await.unwrap();
        assert_eq!(engine.compute_total(), Decimal::new(220, 0));

        engine.remove_item(&key("A", None)).await;
        assert_eq!(engine.compute_total(), Decimal::new(120, 0));

        engine.update_quantity(&key("A", Some("Red/L")), 3).await;
        assert_eq!(engine.compute_total(), Decimal::new(360, 0));

        assert_eq!(remote.remote_total(), Decimal::new(360, 0));
        let validation = engine.validate_for_checkout().await.unwrap();
        assert!(validation.valid);
        assert_eq!(validation.backend_total, Some(Decimal::new(360, 0)));
    }

    // -------------------------------------------------------------------------
    // Best-effort remote calls
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_guest_mutations_never_touch_remote() {
        let (mut engine, remote) = guest();
        let outcome = engine.add_item(product_a(), 1).await.unwrap();
        assert_eq!(outcome.remote, RemoteOutcome::Skipped);
        engine.update_quantity(&key("A", None), 4).await;
        engine.remove_item(&key("A", None)).await;
        engine.clear().await;
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_signed_in_mutations_mirror_remote() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a_red(), 2).await.unwrap();
        engine.update_quantity(&key("A", Some("Red/L")), 5).await;
        engine.remove_item(&key("A", Some("Red/L"))).await;
        let outcome = engine.clear().await;

        assert_eq!(outcome.remote, RemoteOutcome::Applied);
        assert_eq!(
            remote.calls(),
            vec![
                "add A::Red/L x2".to_string(),
                "update A::Red/L =5".to_string(),
                "remove A::Red/L".to_string(),
                "clear".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_failure_never_blocks_local_change() {
        let (mut engine, remote) = signed_in();
        remote.set_failing(true);

        let outcome = engine.add_item(product_a(), 1).await.unwrap();
        assert!(outcome.remote.is_failure());
        assert_eq!(engine.item_count(), 1);

        let outcome = engine.update_quantity(&key("A", None), 3).await;
        assert!(outcome.remote.is_failure());
        assert_eq!(engine.item_count(), 3);

        let outcome = engine.clear().await;
        assert!(outcome.remote.is_failure());
        assert!(engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_remote_timeout_is_a_failure() {
        let remote = FakeRemote::default();
        remote.set_delay(Duration::from_millis(500));
        let mut engine = CartEngine::new(
            remote.clone(),
            MemoryStore::new(),
            SharedSession::signed_in(session()),
            EngineOptions {
                request_timeout: Duration::from_millis(20),
                ..EngineOptions::default()
            },
        );

        let outcome = engine.add_item(product_a(), 1).await.unwrap();
        assert_eq!(
            outcome.remote,
            RemoteOutcome::Failed("Timed out after 20ms".to_string())
        );
        assert_eq!(engine.item_count(), 1);

        let validation = engine.validate_for_checkout().await.unwrap();
        assert!(!validation.valid);
        assert!(matches!(
            validation.issue,
            Some(CheckoutIssue::RemoteUnavailable(_))
        ));
        assert_eq!(validation.backend_total, None);
        assert_eq!(engine.item_count(), 1);
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_sync_preserves_local_presentation() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a_red(), 1).await.unwrap();
        let mut generic = line("A", Some("Red/L"), 130, 4);
        generic.name = "Product A".to_string();
        generic.image_url = Some("https://cdn.example/a.jpg".to_string());
        remote.set_lines(vec![generic, line("B", None, 10, 1)]);

        let report = engine.sync_with_remote().await;

        assert!(report.success);
        let red = engine.snapshot().get(&key("A", Some("Red/L"))).unwrap();
        assert_eq!(red.name, "Product A (Red, L)");
        assert_eq!(red.image_url.as_deref(), Some("https://cdn.example/a-red.jpg"));
        assert_eq!(red.effective_price(), Decimal::new(130, 0));
        assert_eq!(red.quantity, 4);

        let b = engine.snapshot().get(&key("B", None)).unwrap();
        assert_eq!(b.name, "Remote name");
        assert_eq!(report.total, Decimal::new(530, 0));
    }

    #[tokio::test]
    async fn test_sync_drops_lines_missing_remotely() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a(), 1).await.unwrap();
        engine.add_item(product_a_red(), 1).await.unwrap();
        remote.set_lines(vec![line("A", None, 100, 1)]);

        let report = engine.sync_with_remote().await;

        assert!(report.success);
        assert_eq!(report.items.len(), 1);
        assert!(engine.snapshot().get(&key("A", Some("Red/L"))).is_none());
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_local_cart() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a(), 2).await.unwrap();
        remote.set_failing(true);

        let report = engine.sync_with_remote().await;

        assert!(!report.success);
        assert_eq!(report.total, Decimal::new(200, 0));
        assert_eq!(report.items.len(), 1);
        assert!(report.message.unwrap().contains("HTTP 503"));
        assert_eq!(engine.item_count(), 2);
    }

    #[tokio::test]
    async fn test_sync_rejects_out_of_range_remote_total() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a(), 1).await.unwrap();
        remote.set_lines(vec![priced_at_max("A", 1), priced_at_max("B", 1)]);

        let report = engine.sync_with_remote().await;

        assert!(!report.success);
        assert!(report.message.unwrap().contains(TOTAL_OUT_OF_RANGE));
        assert_eq!(report.total, Decimal::new(100, 0));
        assert_eq!(engine.item_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_as_guest_is_a_noop() {
        let (mut engine, remote) = guest();
        engine.add_item(product_a(), 1).await.unwrap();

        let report = engine.sync_with_remote().await;

        assert!(!report.success);
        assert_eq!(report.total, Decimal::new(100, 0));
        assert!(report.message.is_some());
        assert!(remote.calls().is_empty());
    }

    // -------------------------------------------------------------------------
    // Checkout validation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_checkout_requires_session() {
        let (mut engine, remote) = guest();
        engine.add_item(product_a(), 1).await.unwrap();

        let err = engine.validate_for_checkout().await.unwrap_err();

        assert!(matches!(err, CartError::CheckoutBlocked(_)));
        assert!(err.requires_sign_in());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_count_mismatch_resyncs() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a(), 2).await.unwrap();
        remote.set_lines(vec![line("A", None, 100, 2), line("B", None, 50, 1)]);

        let validation = engine.validate_for_checkout().await.unwrap();

        assert!(!validation.valid);
        assert_eq!(
            validation.issue,
            Some(CheckoutIssue::CountMismatch { local: 2, remote: 3 })
        );
        assert!(validation.message.is_some());
        assert_eq!(validation.frontend_total, Decimal::new(200, 0));
        assert_eq!(engine.item_count(), 3);
        assert_eq!(engine.compute_total(), Decimal::new(250, 0));
    }

    #[tokio::test]
    async fn test_checkout_fails_closed_on_out_of_range_remote_total() {
        let (mut engine, remote) = signed_in();
        engine.add_item(product_a(), 1).await.unwrap();
        remote.set_lines(vec![priced_at_max("A", 2)]);

        let validation = engine.validate_for_checkout().await.unwrap();

        assert!(!validation.valid);
        assert_eq!(validation.backend_total, None);
        assert_eq!(validation.frontend_total, Decimal::new(100, 0));
        assert_eq!(
            validation.issue,
            Some(CheckoutIssue::RemoteUnavailable(TOTAL_OUT_OF_RANGE.to_string()))
        );
        assert_eq!(engine.compute_total(), Decimal::new(100, 0));
        assert_eq!(engine.items()[0].list_price, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_checkout_within_tolerance_is_valid() {
        let (mut engine, remote) = signed_in();
        engine
            .add_item(ItemInput::new("A", "Product A", Decimal::new(499_995, 3)), 1)
            .await
            .unwrap();
        remote.set_lines(vec![line("A", None, 500, 1)]);

        let validation = engine.validate_for_checkout().await.unwrap();

        assert!(validation.valid);
        assert_eq!(validation.message, None);
        assert_eq!(validation.frontend_total, Decimal::new(499_995, 3));
        assert_eq!(validation.backend_total, Some(Decimal::new(500, 0)));
        assert_eq!(engine.compute_total(), Decimal::new(500, 0));
    }

    #[tokio::test]
    async fn test_checkout_total_mismatch_resyncs() {
        let (mut engine, remote) = signed_in();
        engine
            .add_item(ItemInput::new("A", "Product A", Decimal::new(499_995, 3)), 1)
            .await
            .unwrap();
        remote.set_lines(vec![line("A", None, 520, 1)]);

        let validation = engine.validate_for_checkout().await.unwrap();

        assert!(!validation.valid);
        assert_eq!(
            validation.issue,
            Some(CheckoutIssue::TotalMismatch {
                local: Decimal::new(499_995, 3),
                remote: Decimal::new(520, 0),
            })
        );
        let message = validation.message.unwrap();
        assert!(message.contains("499.995"));
        assert!(message.contains("520"));
        assert_eq!(engine.compute_total(), Decimal::new(520, 0));
    }

    #[tokio::test]
    async fn test_checkout_keeps_local_presentation() {
        let (mut engine, _) = signed_in();
        engine.add_item(product_a_red(), 1).await.unwrap();

        let validation = engine.validate_for_checkout().await.unwrap();

        assert!(validation.valid);
        let red = &engine.items()[0];
        assert_eq!(red.name, "Product A (Red, L)");
        assert_eq!(red.image_url.as_deref(), Some("https://cdn.example/a-red.jpg"));
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cart_survives_restart() {
        let store = MemoryStore::new();
        let mut engine = CartEngine::new(
            FakeRemote::default(),
            store.clone(),
            Anonymous,
            EngineOptions::default(),
        );
        engine.add_item(product_a(), 1).await.unwrap();
        engine.add_item(product_a_red(), 2).await.unwrap();
        let before = engine.snapshot().clone();
        drop(engine);

        let restarted = CartEngine::new(
            FakeRemote::default(),
            store,
            Anonymous,
            EngineOptions::default(),
        );
        assert_eq!(restarted.snapshot(), &before);
        assert_eq!(restarted.compute_total(), Decimal::new(340, 0));
    }

    #[tokio::test]
    async fn test_sign_in_switches_to_remote_mode() {
        let remote = FakeRemote::default();
        let session_handle = SharedSession::default();
        let mut engine = CartEngine::new(
            remote.clone(),
            MemoryStore::new(),
            session_handle.clone(),
            EngineOptions::default(),
        );
        engine.add_item(product_a(), 1).await.unwrap();
        assert!(!engine.is_authenticated());
        assert!(remote.calls().is_empty());

        session_handle.sign_in(session());
        assert!(engine.is_authenticated());
        engine.add_item(product_a(), 1).await.unwrap();
        assert_eq!(remote.calls(), vec!["add A x1".to_string()]);
    }
}
