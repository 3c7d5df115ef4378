//! Core library for the campus energy dashboard.
//!
//! Talks to the campus energy backend, caches campus data locally for
//! offline use, derives consumption metrics with a fixed precedence of
//! sources, and coordinates refreshes so only one runs at a time.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod engine;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::{ApiClient, RemoteError, RemoteGateway};
pub use auth::TokenStore;
pub use cache::{CacheAges, LocalCacheStore, Preferences};
pub use config::Config;
pub use engine::{MetricsConstants, MetricsEngine};
pub use models::{
    Asset, AssetType, BackendMetrics, Campus, CampusConfig, CampusId, CampusProfile,
    ConsumptionRecord, DerivedMetrics, MetricSource, NewAsset,
};
pub use sync::{DashboardState, SyncError, SyncOrchestrator, SyncOutcome, SyncReport, SyncStatus};
