//! Cached aggregation-query layer: fingerprint cache plus the fixed set
//! of read-only API endpoints it fronts.

pub mod cache;
pub mod handlers;

pub use cache::{Fingerprint, QueryCache, QueryKind};
pub use handlers::AppState;
