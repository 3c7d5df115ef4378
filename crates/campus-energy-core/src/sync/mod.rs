//! Campus selection and data synchronization.
//!
//! `SyncOrchestrator` owns the campus selection, fetches campus-scoped
//! data through a `RemoteGateway`, derives metrics with the
//! `MetricsEngine` and publishes the result as one immutable
//! `DashboardState` snapshot. The asset list and history are written
//! through to the `LocalCacheStore` after every change.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{SyncError, SyncOrchestrator, SyncOutcome, SyncReport};
pub use state::{DashboardState, SyncSlice, SyncStatus};
