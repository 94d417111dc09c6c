//! Cart line items and their composite identity.

use core::fmt;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{IdError, ProductId, VariantKey, parse_optional_variant};

/// Variant dimensions such as `color`, `size` or `storage`.
///
/// A `BTreeMap` keeps serialization order stable so persisted carts diff cleanly.
pub type VariantAttributes = BTreeMap<String, String>;

/// Composite identity of a cart line: base product plus optional variant.
///
/// Two lines are the same entity if and only if their keys are equal. Two
/// variants of the same product are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CartKey {
    /// Base product identity.
    pub product_id: ProductId,
    /// Variant identity (variant SKU), absent for simple products.
    pub variant: Option<VariantKey>,
}

impl CartKey {
    /// Create a key from already-validated identifiers.
    #[must_use]
    pub const fn new(product_id: ProductId, variant: Option<VariantKey>) -> Self {
        Self {
            product_id,
            variant,
        }
    }

    /// Parse a key from raw strings. A blank variant collapses to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the product ID is empty.
    pub fn parse(product_id: &str, variant: Option<&str>) -> Result<Self, IdError> {
        Ok(Self {
            product_id: ProductId::parse(product_id)?,
            variant: parse_optional_variant(variant),
        })
    }
}

impl fmt::Display for CartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}::{variant}", self.product_id),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Base product ID.
    pub product_id: ProductId,
    /// Variant SKU, if a variant was chosen.
    pub variant: Option<VariantKey>,
    /// Display name, possibly variant-qualified ("Shirt (Red, L)").
    pub name: String,
    /// Pre-discount reference price (MRP).
    pub list_price: Decimal,
    /// Authoritative sale price per unit.
    pub sale_price: Option<Decimal>,
    /// Variant image when known, else product image.
    pub image_url: Option<String>,
    /// Units in the cart, always >= 1.
    pub quantity: u32,
    /// Discount percentage as provided by the catalogue.
    pub discount_percent: Option<Decimal>,
    /// Variant dimensions.
    #[serde(default)]
    pub attributes: VariantAttributes,
}

impl LineItem {
    /// The composite identity of this line.
    #[must_use]
    pub fn key(&self) -> CartKey {
        CartKey::new(self.product_id.clone(), self.variant.clone())
    }

    /// Whether this line is identified by `key`.
    #[must_use]
    pub fn matches(&self, key: &CartKey) -> bool {
        self.product_id == key.product_id && self.variant == key.variant
    }

    /// Price per unit used for totals: sale price when present, else list price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.list_price)
    }

    /// Effective price multiplied by quantity, saturating at [`Decimal::MAX`].
    ///
    /// Use [`Self::checked_line_total`] where an out-of-range total must be
    /// detected rather than clamped.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.effective_price().saturating_mul(Decimal::from(self.quantity))
    }

    /// Effective price multiplied by quantity, or `None` on overflow.
    #[must_use]
    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.effective_price().checked_mul(Decimal::from(self.quantity))
    }

    /// Discount percentage, derived from list and sale price when not provided.
    #[must_use]
    pub fn discount(&self) -> Decimal {
        if let Some(provided) = self.discount_percent {
            return provided;
        }
        derive_discount(self.list_price, self.effective_price())
    }

    /// Overwrite every non-identity field except quantity with `other`'s.
    ///
    /// Used when the same product/variant is added again: the newest image,
    /// name and price win over stale display data.
    pub fn refresh_from(&mut self, other: Self) {
        self.name = other.name;
        self.list_price = other.list_price;
        self.sale_price = other.sale_price;
        self.image_url = other.image_url;
        self.discount_percent = other.discount_percent;
        self.attributes = other.attributes;
    }
}

/// Percentage off `list` when paying `effective`, rounded to a whole percent.
#[must_use]
pub fn derive_discount(list: Decimal, effective: Decimal) -> Decimal {
    if list <= Decimal::ZERO || effective >= list {
        return Decimal::ZERO;
    }
    list.checked_sub(effective)
        .and_then(|off| off.checked_div(list))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(Decimal::ZERO, |percent| percent.round())
}

/// Candidate item for an add-to-cart request.
///
/// Identity is carried as raw strings and only validated when the item enters
/// the cart, so UI callers can hand over whatever the product page had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    /// Base product ID (required, must not be blank).
    pub product_id: String,
    /// Variant SKU.
    pub variant: Option<String>,
    /// Display name.
    pub name: String,
    /// List price (MRP).
    pub list_price: Decimal,
    /// Sale price.
    pub sale_price: Option<Decimal>,
    /// Image URL.
    pub image_url: Option<String>,
    /// Discount percentage.
    pub discount_percent: Option<Decimal>,
    /// Variant dimensions.
    pub attributes: VariantAttributes,
}

impl ItemInput {
    /// Create an input for a simple product.
    #[must_use]
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        list_price: Decimal,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            variant: None,
            name: name.into(),
            list_price,
            sale_price: None,
            image_url: None,
            discount_percent: None,
            attributes: VariantAttributes::new(),
        }
    }

    /// Set the variant SKU.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Set the sale price.
    #[must_use]
    pub const fn with_sale_price(mut self, price: Decimal) -> Self {
        self.sale_price = Some(price);
        self
    }

    /// Set the image URL.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Add a variant dimension.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Validate identity and build a line with the given quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the product ID is blank.
    pub fn into_line_item(self, quantity: u32) -> Result<LineItem, IdError> {
        let product_id = ProductId::parse(&self.product_id)?;
        Ok(LineItem {
            product_id,
            variant: parse_optional_variant(self.variant.as_deref()),
            name: self.name,
            list_price: self.list_price,
            sale_price: self.sale_price,
            image_url: self.image_url,
            quantity: quantity.max(1),
            discount_percent: self.discount_percent,
            attributes: self.attributes,
        })
    }
}
