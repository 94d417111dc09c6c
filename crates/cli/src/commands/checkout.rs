//! Remote reconciliation commands.
//!
//! Both commands need `CART_API_BASE_URL`, `CART_SESSION_TOKEN` and `CART_USER_ID`.

use super::cart::log_cart;
use super::{CliEngine, CommandError};

/// `cart sync`
///
/// # Errors
///
/// Returns an error if the remote cart could not be read; the local cart is
/// left as it was.
pub async fn sync(engine: &mut CliEngine) -> Result<(), CommandError> {
    let report = engine.sync_with_remote().await;
    if !report.success {
        return Err(CommandError::SyncFailed(
            report.message.unwrap_or_default(),
        ));
    }
    tracing::info!("Cart synced with remote");
    log_cart(engine.snapshot());
    Ok(())
}

/// `cart checkout`
///
/// # Errors
///
/// Returns an error when no session is configured or the cart did not
/// validate. On a mismatch the local cart has already been corrected.
pub async fn checkout(engine: &mut CliEngine) -> Result<(), CommandError> {
    let validation = engine.validate_for_checkout().await?;

    if !validation.valid {
        tracing::warn!(
            frontend_total = %validation.frontend_total,
            backend_total = ?validation.backend_total,
            "Cart did not validate"
        );
        log_cart(engine.snapshot());
        return Err(CommandError::CheckoutRejected(
            validation.message.unwrap_or_default(),
        ));
    }

    if let Some(total) = validation.backend_total {
        tracing::info!(total = %total, "Cart validated, ready to charge");
    }
    Ok(())
}
