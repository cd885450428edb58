//! Producer -> canonical span conversion
//!
//! Producer spans carry string identifiers; the store wants fixed-width
//! integers. [`hash_id`] bridges the two and [`SpanConverter`] reshapes the
//! rest of the span around it.

pub mod converter;
pub mod hash;

pub use converter::SpanConverter;
pub use hash::{hash_id, HASH_SEED};
