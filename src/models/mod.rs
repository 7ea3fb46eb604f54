//! Core data models for the change scanner.
//!
//! These types describe what flows between the scan phases: object snapshots
//! taken while listing, the signed grants used to copy them, the rows written
//! to the metadata table, and the per-run counters.

pub mod grant;
pub mod object;
pub mod record;
pub mod scan;
