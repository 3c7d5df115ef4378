//! Data models for campus energy monitoring.
//!
//! This module contains the data structures exchanged with the backend
//! and published to views:
//!
//! - `Campus`, `CampusProfile`, `CampusConfig`: site attributes and the
//!   locally editable overrides used when backend data is incomplete
//! - `Asset`, `NewAsset`: monitored infrastructure units
//! - `ConsumptionRecord`: time series readings (electricity and water)
//! - `BackendMetrics`, `DerivedMetrics`: raw aggregates and the computed
//!   sustainability/cost indicators

pub mod asset;
pub mod campus;
pub mod consumption;
pub mod metrics;

pub use asset::{Asset, AssetType, InfrastructureUnit, NewAsset};
pub use campus::{Campus, CampusConfig, CampusId, CampusProfile, CampusStatus};
pub use consumption::{ConsumptionRecord, ConsumptionUnit};
pub use metrics::{
    BackendMetrics, DashboardCampus, DashboardResponse, DashboardSummary, DerivedMetrics,
    MetricSource, MetricSources,
};
