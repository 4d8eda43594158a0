//! # KeelDB Configuration Module
//!
//! This module centralizes all configuration constants for KeelDB. Constants
//! are grouped by their functional area and interdependencies are documented
//! and enforced through compile-time assertions.
//!
//! ## Why Centralization?
//!
//! The page size, the hash-page array capacities and the depth limits are
//! tightly coupled: a directory page must fit its id and depth arrays inside
//! one page, and the depth limits must match the array sizes exactly.
//! Co-locating these values with compile-time checks prevents them from
//! drifting apart.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency
//!   documentation

pub mod constants;
pub use constants::*;
