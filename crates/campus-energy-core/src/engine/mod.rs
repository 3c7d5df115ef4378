//! Pure metric derivation.
//!
//! `MetricsEngine` turns backend aggregates, the consumption history and
//! the campus configuration into a complete `DerivedMetrics` value,
//! choosing each field by the precedence backend > measured > declared >
//! default. Nothing in here performs I/O.

pub mod derive;
pub mod summary;

pub use derive::{MetricsConstants, MetricsEngine};
pub use summary::{asset_totals, load_distribution, AssetTotals, LoadShare};
