//! Ordered cart contents with derived totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::line_item::{CartKey, LineItem};

/// An ordered collection of line items.
///
/// Totals are never stored; they are recomputed from the items on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartSnapshot {
    items: Vec<LineItem>,
}

impl CartSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a snapshot from items, merging lines that share a key.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut snapshot = Self::new();
        for item in items {
            snapshot.upsert(item);
        }
        snapshot
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Consume the snapshot and return its items.
    #[must_use]
    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of effective unit price times quantity over all lines.
    ///
    /// Saturates at [`Decimal::MAX`]; see [`Self::checked_total`].
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.line_total()))
    }

    /// Exact total, or `None` if any line or the sum overflows.
    #[must_use]
    pub fn checked_total(&self) -> Option<Decimal> {
        self.items.iter().try_fold(Decimal::ZERO, |sum, item| {
            sum.checked_add(item.checked_line_total()?)
        })
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Look up a line by key.
    #[must_use]
    pub fn get(&self, key: &CartKey) -> Option<&LineItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Add `item` to the cart.
    ///
    /// An existing line with the same key has its quantity incremented by
    /// `item.quantity` and its display fields refreshed; otherwise `item` is
    /// appended.
    pub fn upsert(&mut self, item: LineItem) {
        let key = item.key();
        match self.items.iter_mut().find(|existing| existing.matches(&key)) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                existing.refresh_from(item);
            }
            None => self.items.push(item),
        }
    }

    /// Remove the line for `key`, returning it if present.
    pub fn remove(&mut self, key: &CartKey) -> Option<LineItem> {
        let index = self.items.iter().position(|item| item.matches(key))?;
        Some(self.items.remove(index))
    }

    /// Set the quantity of an existing line. Returns `false` if the key is absent.
    ///
    /// Callers route quantities below one through [`Self::remove`].
    pub fn set_quantity(&mut self, key: &CartKey, quantity: u32) -> bool {
        match self.items.iter_mut().find(|item| item.matches(key)) {
            Some(item) => {
                item.quantity = quantity.max(1);
                true
            }
            None => false,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
