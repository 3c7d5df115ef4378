use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{asset_totals, load_distribution, AssetTotals, LoadShare, MetricsEngine};
use crate::models::{
    Asset, BackendMetrics, Campus, CampusConfig, CampusId, CampusProfile, ConsumptionRecord,
    DerivedMetrics,
};

/// Lifecycle of the orchestrator: `Idle -> Syncing -> {Synced, Failed}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    Failed(String),
}

/// One of the campus-scoped fetches performed by a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSlice {
    Assets,
    History,
    Metrics,
}

impl std::fmt::Display for SyncSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncSlice::Assets => write!(f, "assets"),
            SyncSlice::History => write!(f, "history"),
            SyncSlice::Metrics => write!(f, "metrics"),
        }
    }
}

/// Everything a view needs for one campus, published as a whole.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardState {
    pub campus_id: Option<CampusId>,
    pub campus: Option<Campus>,
    pub assets: Vec<Asset>,
    pub history: Vec<ConsumptionRecord>,
    pub backend_metrics: Option<BackendMetrics>,
    pub metrics: DerivedMetrics,
    pub load_distribution: Vec<LoadShare>,
    pub asset_totals: AssetTotals,
    /// Most recent electricity reading, by date.
    pub latest_reading: Option<f64>,
    pub has_history: bool,
    pub has_profile: bool,
    /// Restored from the local cache rather than fetched.
    pub from_cache: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

impl DashboardState {
    /// Build a complete snapshot, deriving every metric from the inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        campus_id: CampusId,
        campus: Option<Campus>,
        assets: Vec<Asset>,
        history: Vec<ConsumptionRecord>,
        backend_metrics: Option<BackendMetrics>,
        profile: &CampusProfile,
        engine: &MetricsEngine,
        from_cache: bool,
    ) -> Self {
        let config = CampusConfig::resolve(campus.as_ref(), profile);
        let metrics = engine.derive(backend_metrics.as_ref(), &history, &config);
        let latest_reading = history
            .iter()
            .filter(|r| r.is_electricity())
            .max_by_key(|r| r.parsed_date())
            .map(|r| r.value);

        Self {
            campus_id: Some(campus_id),
            load_distribution: load_distribution(metrics.monthly_kwh),
            asset_totals: asset_totals(&assets, engine.constants().unit_price),
            latest_reading,
            has_history: !history.is_empty(),
            has_profile: config.name.is_some(),
            from_cache,
            synced_at: if from_cache { None } else { Some(Utc::now()) },
            campus,
            assets,
            history,
            backend_metrics,
            metrics,
        }
    }

    /// Same inputs, new profile: recompute the whole snapshot.
    pub fn rederive(&self, profile: &CampusProfile, engine: &MetricsEngine) -> Option<Self> {
        let campus_id = self.campus_id?;
        let mut next = Self::build(
            campus_id,
            self.campus.clone(),
            self.assets.clone(),
            self.history.clone(),
            self.backend_metrics.clone(),
            profile,
            engine,
            self.from_cache,
        );
        next.synced_at = self.synced_at;
        Some(next)
    }

    /// Copy of this snapshot with one more asset.
    pub fn with_asset(&self, asset: Asset, unit_price: f64) -> Self {
        let mut next = self.clone();
        next.assets.push(asset);
        next.asset_totals = asset_totals(&next.assets, unit_price);
        next
    }

    pub fn campus_name(&self) -> Option<&str> {
        self.campus.as_ref().map(|c| c.name.as_str())
    }
}
