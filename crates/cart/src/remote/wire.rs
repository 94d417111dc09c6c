//! Wire types for the remote cart API.
//!
//! Response types mirror what the backend actually sends: every field is
//! optional and several fields have aliases (`price`/`mrp`/`currentPrice`).
//! They are deliberately dumb; [`super::normalize`] decides which alias wins.
//! Request types are the exact bodies the API expects.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Scalars
// =============================================================================

/// A monetary or count value sent either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(serde_json::Number),
    Text(String),
}

impl Amount {
    /// Decimal value, or `None` if the value is blank or not numeric.
    ///
    /// Strings may carry thousands separators ("1,299.00").
    #[must_use]
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
            Self::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    return None;
                }
                Decimal::from_str(&cleaned).ok()
            }
        }
    }
}

/// An identifier sent either as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    /// String form of the identifier.
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

/// An image sent either as a bare URL or as an object with a `url` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawImage {
    Url(String),
    Object { url: Option<String> },
}

impl RawImage {
    /// The URL, if non-blank.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        let url = match self {
            Self::Url(url) => Some(url.as_str()),
            Self::Object { url } => url.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }
}

// =============================================================================
// GET /cart
// =============================================================================

/// Response of `GET /cart`.
///
/// Most deployments return `{ items }`; older ones nest the list under `cart`
/// or `data`.
#[derive(Debug, Default, Deserialize)]
pub struct CartEnvelope {
    #[serde(default)]
    pub items: Option<Vec<RawCartItem>>,
    #[serde(default)]
    pub cart: Option<CartBody>,
    #[serde(default)]
    pub data: Option<CartBody>,
}

/// Nested cart body.
#[derive(Debug, Default, Deserialize)]
pub struct CartBody {
    #[serde(default)]
    pub items: Vec<RawCartItem>,
}

impl CartEnvelope {
    /// The item list, wherever the backend put it.
    #[must_use]
    pub fn into_items(self) -> Vec<RawCartItem> {
        self.items
            .or_else(|| self.cart.map(|c| c.items))
            .or_else(|| self.data.map(|c| c.items))
            .unwrap_or_default()
    }
}

/// Product reference embedded in a cart item: either a bare ID or a
/// populated product document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawProductRef {
    Id(Scalar),
    Document(RawProduct),
}

/// Populated product document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProduct {
    #[serde(rename = "_id")]
    pub object_id: Option<Scalar>,
    pub id: Option<Scalar>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub image: Option<RawImage>,
    pub price: Option<Amount>,
}

/// One item of `GET /cart`, exactly as sent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCartItem {
    pub product_id: Option<Scalar>,
    #[serde(rename = "product_id")]
    pub product_id_snake: Option<Scalar>,
    pub product: Option<RawProductRef>,

    pub variant_sku: Option<String>,
    pub sku: Option<String>,

    pub title: Option<String>,
    pub name: Option<String>,

    pub image_url: Option<String>,
    pub image: Option<RawImage>,
    #[serde(default)]
    pub images: Vec<RawImage>,

    pub price: Option<Amount>,
    pub mrp: Option<Amount>,
    pub current_price: Option<Amount>,

    pub unit_price: Option<Amount>,
    pub sale_price: Option<Amount>,
    pub current_sale_price: Option<Amount>,

    pub qty: Option<Amount>,
    pub quantity: Option<Amount>,

    pub discount: Option<Amount>,
    pub discount_percentage: Option<Amount>,

    pub variant_attributes: Option<serde_json::Map<String, serde_json::Value>>,
}

// =============================================================================
// Request bodies
// =============================================================================

/// Body of `POST /cart/add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub user_id: String,
    pub items: Vec<AddItem>,
}

/// One item of `POST /cart/add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub qty: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_attributes: Option<std::collections::BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Body of `POST /cart/remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    pub user_id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

/// Body of `POST /cart/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub user_id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub quantity: u32,
}

/// Body of `POST /cart/clear`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    pub user_id: String,
}
