//! Normalization of loose remote cart JSON into [`LineItem`]s.
//!
//! Each field has an explicit, ordered fallback chain; the first alias that is
//! present and usable wins:
//!
//! | Field       | Chain                                                            |
//! |-------------|------------------------------------------------------------------|
//! | product id  | `productId`, `product_id`, `product._id`, `product.id`, `product` |
//! | variant     | `variantSku`, `sku`                                              |
//! | name        | `title`, `name`, `product.title`, `product.name`                 |
//! | image       | `imageUrl`, `image`, `images[0]`, `product.image`                |
//! | list price  | `price`, `mrp`, `currentPrice`, `product.price`                  |
//! | sale price  | `unitPrice`, `salePrice`, `currentSalePrice`                     |
//! | quantity    | `qty`, `quantity` (default 1)                                    |
//! | discount    | `discount`, `discountPercentage`                                 |

use cartwheel_core::{
    CartSnapshot, LineItem, ProductId, VariantAttributes, parse_optional_variant,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::warn;

use super::wire::{Amount, RawCartItem, RawImage, RawProduct, RawProductRef};

/// Normalize a remote cart. Lines sharing a key are merged.
#[must_use]
pub fn normalize_cart(items: Vec<RawCartItem>) -> Vec<LineItem> {
    CartSnapshot::from_items(items.into_iter().filter_map(normalize_item)).into_items()
}

/// Normalize one remote item.
///
/// Returns `None`, with a warning, for items that cannot be addressed (no
/// product id) or priced (no price at all, or a line total out of range), and
/// silently for items whose quantity is zero or negative.
#[must_use]
pub fn normalize_item(raw: RawCartItem) -> Option<LineItem> {
    let product = match &raw.product {
        Some(RawProductRef::Document(doc)) => Some(doc),
        _ => None,
    };

    let Some(product_id) = product_id(&raw, product) else {
        warn!(title = ?raw.title, "Remote cart item has no product id, skipping");
        return None;
    };

    let quantity = quantity(&raw)?;

    let sale_price = first_decimal([&raw.unit_price, &raw.sale_price, &raw.current_sale_price]);
    let list_price = first_decimal([
        &raw.price,
        &raw.mrp,
        &raw.current_price,
        &product.and_then(|p| p.price.clone()),
    ]);
    let Some(list_price) = list_price.or(sale_price) else {
        warn!(product_id = %product_id, "Remote cart item has no price, skipping");
        return None;
    };

    let name = first_text([
        raw.title.as_deref(),
        raw.name.as_deref(),
        product.and_then(|p| p.title.as_deref()),
        product.and_then(|p| p.name.as_deref()),
    ])
    .unwrap_or_default();

    let image_url = first_text([
        raw.image_url.as_deref(),
        raw.image.as_ref().and_then(RawImage::url),
        raw.images.first().and_then(RawImage::url),
        product.and_then(|p| p.image.as_ref()).and_then(RawImage::url),
    ]);

    let item = LineItem {
        product_id,
        variant: parse_optional_variant(raw.variant_sku.as_deref().or(raw.sku.as_deref())),
        name,
        list_price,
        sale_price,
        image_url,
        quantity,
        discount_percent: first_decimal([&raw.discount, &raw.discount_percentage]),
        attributes: attributes(&raw),
    };

    if item.checked_line_total().is_none() {
        warn!(
            product_id = %item.product_id,
            price = %item.effective_price(),
            quantity,
            "Remote cart item total is out of range, skipping"
        );
        return None;
    }
    Some(item)
}

fn product_id(raw: &RawCartItem, product: Option<&RawProduct>) -> Option<ProductId> {
    let bare = match &raw.product {
        Some(RawProductRef::Id(id)) => Some(id),
        _ => None,
    };
    [
        raw.product_id.as_ref(),
        raw.product_id_snake.as_ref(),
        product.and_then(|p| p.object_id.as_ref()),
        product.and_then(|p| p.id.as_ref()),
        bare,
    ]
    .into_iter()
    .flatten()
    .find_map(|id| ProductId::parse(&id.as_string()).ok())
}

/// Quantity from `qty` then `quantity`; missing means one, non-positive means drop.
fn quantity(raw: &RawCartItem) -> Option<u32> {
    let Some(qty) = first_decimal([&raw.qty, &raw.quantity]) else {
        return Some(1);
    };
    if qty <= Decimal::ZERO {
        return None;
    }
    Some(qty.trunc().to_u32().unwrap_or(u32::MAX).max(1))
}

fn attributes(raw: &RawCartItem) -> VariantAttributes {
    raw.variant_attributes
        .iter()
        .flatten()
        .filter_map(|(name, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => return None,
                other => other.to_string(),
            };
            Some((name.clone(), value))
        })
        .collect()
}

fn first_decimal<const N: usize>(chain: [&Option<Amount>; N]) -> Option<Decimal> {
    chain
        .into_iter()
        .find_map(|amount| amount.as_ref().and_then(Amount::to_decimal))
}

fn first_text<const N: usize>(chain: [Option<&str>; N]) -> Option<String> {
    chain
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}
