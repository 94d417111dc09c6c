//! Core types for Cartwheel.
//!
//! This module provides type-safe wrappers for cart domain concepts.

pub mod id;
pub mod line_item;
pub mod snapshot;

pub use id::*;
pub use line_item::{CartKey, ItemInput, LineItem, VariantAttributes};
pub use snapshot::CartSnapshot;
