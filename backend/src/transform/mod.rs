//! Transformation module.
//!
//! This module turns raw extracts into the canonical table:
//! - Unify: row-wise concatenation of several extracts
//! - Normalize: rename, default injection, year coercion, projection
//! - Pipeline: the Extract → Unify → Transform → Load orchestrator

pub mod normalize;
pub mod pipeline;
pub mod unify;

pub use normalize::{normalize_year, transform};
pub use pipeline::*;
pub use unify::unify;
