//! Value conversions applied during materialization.
//!
//! Covers the provider-specific encodings (spatial, hierarchy) and the
//! sub-second temporal rounding policy.

pub mod hierarchy;
pub mod spatial;
pub mod temporal;
