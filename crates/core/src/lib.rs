//! Cartwheel Core - Shared cart types library.
//!
//! This crate provides the types used across all Cartwheel components:
//! - `cart` - The cart reconciliation engine and its store clients
//! - `cli` - Command-line driver for the engine
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no persistence. This keeps it lightweight and allows it to be used
//! anywhere, including from synchronous UI code that only needs totals.
//!
//! # Modules
//!
//! - [`types`] - Newtype identifiers, line items, composite keys and snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
