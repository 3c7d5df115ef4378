use async_trait::async_trait;

use super::RemoteError;
use crate::models::{Asset, BackendMetrics, Campus, CampusId, ConsumptionRecord, NewAsset};

/// Typed access to the backend.
///
/// Implementations return normalized models; interpreting failures as
/// missing data is left to the caller.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_campuses(&self) -> Result<Vec<Campus>, RemoteError>;

    async fn campus(&self, campus_id: CampusId) -> Result<Campus, RemoteError>;

    async fn assets(&self, campus_id: CampusId) -> Result<Vec<Asset>, RemoteError>;

    async fn consumption_history(
        &self,
        campus_id: CampusId,
    ) -> Result<Vec<ConsumptionRecord>, RemoteError>;

    /// Aggregate metrics, scoped to one campus when an id is given.
    async fn dashboard_metrics(
        &self,
        campus_id: Option<CampusId>,
    ) -> Result<BackendMetrics, RemoteError>;

    async fn create_asset(
        &self,
        campus_id: CampusId,
        asset: &NewAsset,
    ) -> Result<Asset, RemoteError>;
}
