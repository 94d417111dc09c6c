//! Cart mutation and display commands.
//!
//! # Usage
//!
//! ```bash
//! cart show
//! cart add mug "Mug" 49.99 -q 2
//! cart set-qty mug 3
//! cart remove mug
//! cart clear
//! ```

use cartwheel_cart::{MutationOutcome, RemoteOutcome};
use cartwheel_core::{CartKey, CartSnapshot, ItemInput};

use super::{CliEngine, CommandError};

/// Log every line and the total.
pub fn log_cart(cart: &CartSnapshot) {
    if cart.is_empty() {
        tracing::info!("Cart is empty");
        return;
    }
    for item in cart.items() {
        tracing::info!(
            key = %item.key(),
            quantity = item.quantity,
            unit_price = %item.effective_price(),
            line_total = %item.line_total(),
            "{}",
            item.name
        );
    }
    tracing::info!(
        items = cart.item_count(),
        total = %cart.total(),
        "Cart total"
    );
}

fn report(outcome: &MutationOutcome) {
    match &outcome.remote {
        RemoteOutcome::Skipped => tracing::info!("Saved locally (guest cart)"),
        RemoteOutcome::Applied => tracing::info!("Saved locally and on the remote cart"),
        RemoteOutcome::Failed(reason) => {
            tracing::warn!("Saved locally; remote cart not updated: {reason}");
        }
    }
    log_cart(&outcome.snapshot);
}

/// `cart show`
pub fn show(engine: &CliEngine) {
    log_cart(engine.snapshot());
}

/// `cart add`
///
/// # Errors
///
/// Returns an error if the item has no product ID.
pub async fn add(
    engine: &mut CliEngine,
    input: ItemInput,
    quantity: u32,
) -> Result<(), CommandError> {
    let outcome = engine.add_item(input, quantity).await?;
    report(&outcome);
    Ok(())
}

/// `cart remove`
///
/// # Errors
///
/// Returns an error if the product ID is blank.
pub async fn remove(
    engine: &mut CliEngine,
    product_id: &str,
    variant: Option<&str>,
) -> Result<(), CommandError> {
    let key = CartKey::parse(product_id, variant)?;
    let outcome = engine.remove_item(&key).await;
    report(&outcome);
    Ok(())
}

/// `cart set-qty`
///
/// # Errors
///
/// Returns an error if the product ID is blank.
pub async fn set_quantity(
    engine: &mut CliEngine,
    product_id: &str,
    variant: Option<&str>,
    quantity: i64,
) -> Result<(), CommandError> {
    let key = CartKey::parse(product_id, variant)?;
    let outcome = engine.update_quantity(&key, quantity).await;
    report(&outcome);
    Ok(())
}

/// `cart clear`
pub async fn clear(engine: &mut CliEngine) {
    let outcome = engine.clear().await;
    report(&outcome);
}
