use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::state::{DashboardState, SyncSlice, SyncStatus};
use crate::api::{RemoteError, RemoteGateway};
use crate::cache::LocalCacheStore;
use crate::engine::MetricsEngine;
use crate::models::{
    Asset, BackendMetrics, Campus, CampusId, CampusProfile, ConsumptionRecord, NewAsset,
};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No campus available")]
    NoCampus,

    #[error("Failed to load campus list: {0}")]
    CampusList(#[source] RemoteError),

    #[error("Unknown campus {0}")]
    UnknownCampus(CampusId),
}

/// What a completed sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub campus_id: CampusId,
    /// Slices whose fetch failed and were filled from previous or cached data.
    pub degraded: Vec<SyncSlice>,
    /// Responses thrown away because the selection changed mid-flight.
    pub discarded_rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(SyncReport),
    /// Another sync was running; this request was dropped.
    AlreadySyncing,
    /// Nothing published: no campus could be resolved.
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct Selection {
    campus_id: Option<CampusId>,
    /// Bumped on every selection change.
    epoch: u64,
}

/// An asset created locally, tagged with the revision it was created at.
#[derive(Debug, Clone)]
struct CreatedAsset {
    campus_id: CampusId,
    revision: u64,
    asset: Asset,
}

/// One round of campus-scoped fetch results.
struct Fetched {
    campus: Option<Campus>,
    assets: Result<Vec<Asset>, RemoteError>,
    history: Result<Vec<ConsumptionRecord>, RemoteError>,
    metrics: Result<BackendMetrics, RemoteError>,
    /// Asset revision when the fan-out started.
    revision: u64,
}

/// Resets the in-flight flag when a sync ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates campus selection and data freshness.
///
/// Shared by reference; all methods take `&self`. At most one sync runs
/// at a time per orchestrator, and the published `DashboardState` is
/// swapped in whole so readers never see a half-updated snapshot.
pub struct SyncOrchestrator {
    gateway: Arc<dyn RemoteGateway>,
    cache: LocalCacheStore,
    engine: MetricsEngine,
    campuses: RwLock<Vec<Campus>>,
    selection: RwLock<Selection>,
    profile: RwLock<CampusProfile>,
    state: RwLock<Arc<DashboardState>>,
    status: RwLock<SyncStatus>,
    in_flight: AtomicBool,
    asset_revision: AtomicU64,
    /// Created assets a fetch that started earlier may not contain yet.
    created: RwLock<Vec<CreatedAsset>>,
}

impl SyncOrchestrator {
    pub fn new(gateway: Arc<dyn RemoteGateway>, cache: LocalCacheStore, engine: MetricsEngine) -> Self {
        Self {
            gateway,
            cache,
            engine,
            campuses: RwLock::new(Vec::new()),
            selection: RwLock::new(Selection::default()),
            profile: RwLock::new(CampusProfile::default()),
            state: RwLock::new(Arc::new(DashboardState::default())),
            status: RwLock::new(SyncStatus::Idle),
            in_flight: AtomicBool::new(false),
            asset_revision: AtomicU64::new(0),
            created: RwLock::new(Vec::new()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The currently published snapshot.
    pub async fn snapshot(&self) -> Arc<DashboardState> {
        Arc::clone(&*self.state.read().await)
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub async fn campuses(&self) -> Vec<Campus> {
        self.campuses.read().await.clone()
    }

    pub async fn selected_campus(&self) -> Option<CampusId> {
        self.selection.read().await.campus_id
    }

    pub async fn profile(&self) -> CampusProfile {
        self.profile.read().await.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &LocalCacheStore {
        &self.cache
    }

    pub fn engine(&self) -> &MetricsEngine {
        &self.engine
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Restore selection, profile and the last campus data from the local
    /// cache and derive metrics from them. No network access.
    pub async fn load_from_cache(&self) {
        let profile = self.cache.load_profile();
        *self.profile.write().await = profile.clone();

        let Some(campus_id) = self.cache.load_selection() else {
            debug!("No cached campus selection");
            return;
        };
        self.selection.write().await.campus_id = Some(campus_id);

        let assets = self.cache.load_assets(campus_id);
        let history = self.cache.load_history(campus_id);
        debug!(
            campus_id,
            assets = assets.len(),
            records = history.len(),
            "Restored campus data from cache"
        );

        let state = DashboardState::build(
            campus_id,
            None,
            assets,
            history,
            None,
            &profile,
            &self.engine,
            true,
        );
        *self.state.write().await = Arc::new(state);
    }

    /// Check if cached data for the selected campus is stale
    pub async fn is_cache_stale(&self) -> bool {
        match self.selected_campus().await {
            Some(id) => self.cache.any_stale(id),
            None => true,
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    async fn set_selection(&self, campus_id: CampusId) {
        {
            let mut selection = self.selection.write().await;
            selection.campus_id = Some(campus_id);
            selection.epoch += 1;
        }
        if let Err(e) = self.cache.save_selection(campus_id) {
            warn!(error = %e, "Failed to cache campus selection");
        }
    }

    /// Select a campus and refresh its data.
    ///
    /// If a sync is already running, that sync notices the new selection,
    /// discards its responses and fetches this campus instead.
    ///
    /// Ids missing from a loaded campus list are rejected and the current
    /// selection is kept.
    pub async fn select_campus(&self, campus_id: CampusId) -> SyncOutcome {
        if self.campuses.read().await.is_empty() {
            if let Err(e) = self.refresh_campuses().await {
                debug!(error = %e, "Campus list unavailable, selection not checked");
            }
        }
        {
            let campuses = self.campuses.read().await;
            if !campuses.is_empty() && !campuses.iter().any(|c| c.id == campus_id) {
                warn!(campus_id, "Rejecting selection of unknown campus");
                return SyncOutcome::Failed(SyncError::UnknownCampus(campus_id).to_string());
            }
        }

        info!(campus_id, "Campus selected");
        self.set_selection(campus_id).await;
        self.sync(None).await
    }

    /// Reload the campus list from the backend.
    pub async fn refresh_campuses(&self) -> Result<usize, RemoteError> {
        let campuses = self.gateway.list_campuses().await?;
        let count = campuses.len();
        *self.campuses.write().await = campuses;
        info!(count, "Campus list refreshed");
        Ok(count)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Refresh campus-scoped data and recompute metrics.
    ///
    /// `campus_override` targets a campus without changing the selection.
    /// Returns `AlreadySyncing` without doing anything when another sync
    /// is in flight.
    pub async fn sync(&self, campus_override: Option<CampusId>) -> SyncOutcome {
        let Some(_in_flight) = self.try_begin() else {
            debug!("Sync already in flight, dropping request");
            return SyncOutcome::AlreadySyncing;
        };

        *self.status.write().await = SyncStatus::Syncing;

        match self.run_sync(campus_override).await {
            Ok(report) => {
                info!(
                    campus_id = report.campus_id,
                    degraded = report.degraded.len(),
                    "Sync complete"
                );
                *self.status.write().await = SyncStatus::Synced;
                SyncOutcome::Synced(report)
            }
            Err(e) => {
                warn!(error = %e, "Sync failed");
                let message = e.to_string();
                *self.status.write().await = SyncStatus::Failed(message.clone());
                SyncOutcome::Failed(message)
            }
        }
    }

    async fn run_sync(&self, campus_override: Option<CampusId>) -> Result<SyncReport, SyncError> {
        self.ensure_campuses(campus_override).await?;

        let mut campus_override = campus_override;
        let mut discarded_rounds = 0;

        loop {
            let selection = *self.selection.read().await;
            let target = match campus_override.or(selection.campus_id) {
                Some(id) => id,
                None => self
                    .campuses
                    .read()
                    .await
                    .first()
                    .map(|c| c.id)
                    .ok_or(SyncError::NoCampus)?,
            };

            debug!(campus_id = target, epoch = selection.epoch, "Fetching campus data");
            let revision = self.asset_revision.load(Ordering::Acquire);
            let gateway = &self.gateway;
            let (assets, history, metrics) = tokio::join!(
                gateway.assets(target),
                gateway.consumption_history(target),
                gateway.dashboard_metrics(Some(target)),
            );
            let campus = self.resolve_campus(target).await;
            let fetched = Fetched {
                campus,
                assets,
                history,
                metrics,
                revision,
            };

            // Last request wins: a newer selection invalidates these responses
            if self.selection.read().await.epoch != selection.epoch {
                info!(campus_id = target, "Selection changed during sync, discarding responses");
                discarded_rounds += 1;
                campus_override = None;
                continue;
            }

            let degraded = self.publish(target, fetched).await;

            // A selection that landed while publishing still needs its own round
            if campus_override.is_none() && self.selection.read().await.epoch != selection.epoch {
                debug!("Selection changed after publish, syncing again");
                continue;
            }

            return Ok(SyncReport {
                campus_id: target,
                degraded,
                discarded_rounds,
            });
        }
    }

    /// Load the campus list if needed and select the first campus when
    /// nothing is selected yet.
    async fn ensure_campuses(&self, campus_override: Option<CampusId>) -> Result<(), SyncError> {
        let selected = self.selected_campus().await;

        if self.campuses.read().await.is_empty() {
            match self.gateway.list_campuses().await {
                Ok(list) => {
                    debug!(count = list.len(), "Campus list loaded");
                    *self.campuses.write().await = list;
                }
                // Without a known target there is nothing to fall back on
                Err(e) if campus_override.is_none() && selected.is_none() => {
                    return Err(SyncError::CampusList(e));
                }
                Err(e) => {
                    warn!(error = %e, "Campus list unavailable, continuing with known campus");
                }
            }
        }

        if campus_override.is_none() && selected.is_none() {
            let first = self.campuses.read().await.first().map(|c| c.id);
            match first {
                Some(id) => {
                    debug!(campus_id = id, "Selecting first campus");
                    self.set_selection(id).await;
                }
                None => return Err(SyncError::NoCampus),
            }
        }

        Ok(())
    }

    /// Merge fetch results with previous data and publish one snapshot.
    async fn publish(&self, campus_id: CampusId, fetched: Fetched) -> Vec<SyncSlice> {
        let previous = self.snapshot().await;
        let same_campus = previous.campus_id == Some(campus_id);
        let mut degraded = Vec::new();

        let fetched_assets = fetched.assets.is_ok();
        let mut assets = match fetched.assets {
            Ok(assets) => {
                debug!(count = assets.len(), "Assets fetched");
                assets
            }
            Err(e) => {
                warn!(error = %e, campus_id, "Assets fetch failed, keeping previous data");
                degraded.push(SyncSlice::Assets);
                if same_campus {
                    previous.assets.clone()
                } else {
                    self.cache.load_assets(campus_id)
                }
            }
        };

        let history = match fetched.history {
            Ok(history) => {
                debug!(count = history.len(), "Consumption history fetched");
                history
            }
            Err(e) => {
                warn!(error = %e, campus_id, "History fetch failed, keeping previous data");
                degraded.push(SyncSlice::History);
                if same_campus {
                    previous.history.clone()
                } else {
                    self.cache.load_history(campus_id)
                }
            }
        };

        let backend_metrics = match fetched.metrics {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, campus_id, "Dashboard metrics fetch failed, deriving locally");
                degraded.push(SyncSlice::Metrics);
                None
            }
        };

        let profile = self.profile().await;

        // Lock order: state, then created. Cache writes happen under the
        // state lock so they land in publish order.
        let mut current = self.state.write().await;
        {
            let mut created = self.created.write().await;
            for pending in created.iter().filter(|p| p.campus_id == campus_id) {
                if !assets.iter().any(|a| a.id == pending.asset.id) {
                    debug!(asset_id = pending.asset.id, "Keeping asset created during sync");
                    assets.push(pending.asset.clone());
                }
            }
            if fetched_assets {
                created.retain(|p| p.campus_id != campus_id || p.revision > fetched.revision);
            }
        }

        let state = Arc::new(DashboardState::build(
            campus_id,
            fetched.campus,
            assets,
            history,
            backend_metrics,
            &profile,
            &self.engine,
            false,
        ));
        *current = Arc::clone(&state);

        if let Err(e) = self.cache.save_assets(campus_id, &state.assets) {
            warn!(error = %e, "Failed to cache assets");
        }
        if let Err(e) = self.cache.save_history(campus_id, &state.history) {
            warn!(error = %e, "Failed to cache consumption history");
        }
        drop(current);

        degraded
    }

    /// Find a campus in the list, asking the backend for ones it lacks.
    async fn resolve_campus(&self, campus_id: CampusId) -> Option<Campus> {
        let known = self
            .campuses
            .read()
            .await
            .iter()
            .find(|c| c.id == campus_id)
            .cloned();
        if known.is_some() {
            return known;
        }
        match self.gateway.campus(campus_id).await {
            Ok(campus) => {
                self.campuses.write().await.push(campus.clone());
                Some(campus)
            }
            Err(e) => {
                debug!(error = %e, campus_id, "Campus details unavailable");
                None
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create an asset on the backend and append it locally.
    ///
    /// Returns `false` when the input is invalid, no campus is selected, or
    /// the backend rejects it. Does not trigger a resync.
    pub async fn add_asset(&self, new_asset: NewAsset) -> bool {
        if !new_asset.is_valid() {
            warn!(name = %new_asset.name, "Rejecting asset without a valid name and consumption");
            return false;
        }

        let campus_id = match self.selected_campus().await {
            Some(id) => id,
            None => match self.snapshot().await.campus_id {
                Some(id) => id,
                None => {
                    warn!("Cannot add asset without a campus");
                    return false;
                }
            },
        };

        let asset = match self.gateway.create_asset(campus_id, &new_asset).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(error = %e, campus_id, "Asset creation failed");
                return false;
            }
        };
        info!(campus_id, asset_id = asset.id, "Asset created");

        let unit_price = self.engine.constants().unit_price;
        let mut state = self.state.write().await;
        let assets = {
            let revision = self.asset_revision.fetch_add(1, Ordering::AcqRel) + 1;
            self.created.write().await.push(CreatedAsset {
                campus_id,
                revision,
                asset: asset.clone(),
            });

            if state.campus_id == Some(campus_id) {
                if !state.assets.iter().any(|a| a.id == asset.id) {
                    *state = Arc::new(state.with_asset(asset, unit_price));
                }
                state.assets.clone()
            } else {
                let mut cached = self.cache.load_assets(campus_id);
                if !cached.iter().any(|a| a.id == asset.id) {
                    cached.push(asset);
                }
                cached
            }
        };

        if let Err(e) = self.cache.save_assets(campus_id, &assets) {
            warn!(error = %e, "Failed to cache assets");
        }
        drop(state);
        true
    }

    /// Merge edits into the campus profile, persist it, and recompute the
    /// published metrics from the data already on screen.
    pub async fn update_profile(&self, patch: CampusProfile) -> Result<CampusProfile> {
        let mut profile = self.profile.write().await;
        let mut next = profile.clone();
        next.merge(patch);
        self.cache.save_profile(&next)?;
        *profile = next.clone();
        drop(profile);

        self.rederive_published(&next).await;
        Ok(next)
    }

    /// Drop every profile override and recompute from backend data alone.
    pub async fn reset_profile(&self) -> Result<()> {
        let mut profile = self.profile.write().await;
        self.cache.clear_profile()?;
        *profile = CampusProfile::default();
        drop(profile);

        self.rederive_published(&CampusProfile::default()).await;
        Ok(())
    }

    async fn rederive_published(&self, profile: &CampusProfile) {
        let mut state = self.state.write().await;
        if let Some(rederived) = state.rederive(profile, &self.engine) {
            *state = Arc::new(rederived);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Asset, AssetType, BackendMetrics, CampusStatus, ConsumptionRecord, ConsumptionUnit,
        MetricSource,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeGateway {
        campuses: Vec<Campus>,
        assets: Mutex<HashMap<CampusId, Vec<Asset>>>,
        history: Mutex<HashMap<CampusId, Vec<ConsumptionRecord>>>,
        metrics: Mutex<Option<BackendMetrics>>,
        fail_campuses: AtomicBool,
        fail_assets: AtomicBool,
        fail_history: AtomicBool,
        fail_create: AtomicBool,
        delay: Option<Duration>,
        campus_delay: Option<Duration>,
        fanouts: AtomicUsize,
        creates: AtomicUsize,
    }

    impl FakeGateway {
        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl RemoteGateway for FakeGateway {
        async fn list_campuses(&self) -> Result<Vec<Campus>, RemoteError> {
            if self.fail_campuses.load(Ordering::SeqCst) {
                return Err(RemoteError::Timeout);
            }
            Ok(self.campuses.clone())
        }

        async fn campus(&self, campus_id: CampusId) -> Result<Campus, RemoteError> {
            if let Some(delay) = self.campus_delay {
                tokio::time::sleep(delay).await;
            }
            self.campuses
                .iter()
                .find(|c| c.id == campus_id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(campus_id.to_string()))
        }

        async fn assets(&self, campus_id: CampusId) -> Result<Vec<Asset>, RemoteError> {
            self.fanouts.fetch_add(1, Ordering::SeqCst);
            // Reply with the list as it was when the request arrived
            let snapshot = self.assets.lock().unwrap().get(&campus_id).cloned();
            self.pause().await;
            if self.fail_assets.load(Ordering::SeqCst) {
                return Err(RemoteError::ServerError {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(snapshot.unwrap_or_default())
        }

        async fn consumption_history(
            &self,
            campus_id: CampusId,
        ) -> Result<Vec<ConsumptionRecord>, RemoteError> {
            self.pause().await;
            if self.fail_history.load(Ordering::SeqCst) {
                return Err(RemoteError::Timeout);
            }
            let history = self.history.lock().unwrap();
            Ok(history.get(&campus_id).cloned().unwrap_or_default())
        }

        async fn dashboard_metrics(
            &self,
            _campus_id: Option<CampusId>,
        ) -> Result<BackendMetrics, RemoteError> {
            self.pause().await;
            self.metrics
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| RemoteError::NotFound("metrics".into()))
        }

        async fn create_asset(
            &self,
            campus_id: CampusId,
            asset: &NewAsset,
        ) -> Result<Asset, RemoteError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(RemoteError::AccessDenied("read only".into()));
            }
            let created = Asset {
                id: 100 + self.creates.load(Ordering::SeqCst) as i64,
                name: asset.name.clone(),
                asset_type: asset.asset_type,
                consumption: asset.avg_daily_kwh,
                location: asset.location.clone().unwrap_or_else(|| asset.name.clone()),
                active: true,
                is_critical: asset.is_critical,
            };
            self.assets
                .lock()
                .unwrap()
                .entry(campus_id)
                .or_default()
                .push(created.clone());
            Ok(created)
        }
    }

    fn campus(id: CampusId, name: &str, baseline: f64) -> Campus {
        Campus {
            id,
            name: name.to_string(),
            city: Some("Bogotá".to_string()),
            population_students: Some(1000),
            population_staff: Some(100),
            total_area_sqm: Some(5000.0),
            baseline_energy_kwh: Some(baseline),
            primary_usage: None,
            target_reduction_percent: None,
            status: CampusStatus::Online,
        }
    }

    fn asset(id: i64, name: &str) -> Asset {
        Asset {
            id,
            name: name.to_string(),
            asset_type: AssetType::Hvac,
            consumption: 120.0,
            location: "Block A".to_string(),
            active: true,
            is_critical: false,
        }
    }

    fn daily_history(days: usize, value: f64) -> Vec<ConsumptionRecord> {
        (1..=days)
            .map(|d| ConsumptionRecord::new(format!("2025-01-{:02}", d), value, ConsumptionUnit::Kwh))
            .collect()
    }

    fn gateway() -> FakeGateway {
        let mut assets = HashMap::new();
        assets.insert(1, vec![asset(1, "Chiller")]);
        assets.insert(2, vec![asset(2, "Lab hood"), asset(3, "Server room")]);
        let mut history = HashMap::new();
        history.insert(1, daily_history(30, 100.0));
        history.insert(2, daily_history(10, 50.0));
        FakeGateway {
            campuses: vec![campus(1, "Norte", 14500.0), campus(2, "Sur", 800.0)],
            assets: Mutex::new(assets),
            history: Mutex::new(history),
            ..Default::default()
        }
    }

    fn orchestrator(gateway: Arc<FakeGateway>) -> (SyncOrchestrator, TempDir) {
        let dir = TempDir::new().unwrap();
        let cache = LocalCacheStore::new(dir.path().to_path_buf()).unwrap();
        let orch = SyncOrchestrator::new(gateway, cache, MetricsEngine::default());
        (orch, dir)
    }

    fn synced(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Synced(report) => report,
            other => panic!("expected a completed sync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sync_selects_first_campus_and_derives_metrics() {
        let (orch, _dir) = orchestrator(Arc::new(gateway()));

        let report = synced(orch.sync(None).await);
        assert_eq!(report.campus_id, 1);
        assert_eq!(report.degraded, vec![SyncSlice::Metrics]);
        assert_eq!(orch.selected_campus().await, Some(1));
        assert_eq!(orch.status().await, SyncStatus::Synced);

        let state = orch.snapshot().await;
        assert_eq!(state.campus_name(), Some("Norte"));
        assert_eq!(state.assets.len(), 1);
        assert_eq!(state.metrics.monthly_kwh, 3000.0);
        assert_eq!(state.metrics.sources.monthly_kwh, MetricSource::Measured);
        assert_eq!(state.metrics.efficiency_score, 95.0);
        assert!(!state.from_cache);
        assert!(state.synced_at.is_some());
    }

    #[tokio::test]
    async fn test_backend_metrics_take_precedence() {
        let gw = gateway();
        *gw.metrics.lock().unwrap() = Some(BackendMetrics {
            monthly_kwh: Some(12000.0),
            efficiency_score: Some(71.0),
            ..Default::default()
        });
        let (orch, _dir) = orchestrator(Arc::new(gw));

        let report = synced(orch.sync(None).await);
        assert!(report.degraded.is_empty());

        let state = orch.snapshot().await;
        assert_eq!(state.metrics.monthly_kwh, 12000.0);
        assert_eq!(state.metrics.sources.monthly_kwh, MetricSource::Backend);
        assert_eq!(state.metrics.efficiency_score, 71.0);
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_rejected_without_fanout() {
        let mut gw = gateway();
        gw.delay = Some(Duration::from_millis(30));
        let gw = Arc::new(gw);
        let (orch, _dir) = orchestrator(Arc::clone(&gw));

        let (first, second) = tokio::join!(orch.sync(None), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            orch.sync(None).await
        });

        assert!(matches!(first, SyncOutcome::Synced(_)));
        assert_eq!(second, SyncOutcome::AlreadySyncing);
        assert_eq!(gw.fanouts.load(Ordering::SeqCst), 1);
        assert!(!orch.is_syncing());
    }

    #[tokio::test]
    async fn test_failed_history_keeps_previous_history() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.sync(None).await);

        gw.fail_history.store(true, Ordering::SeqCst);
        let report = synced(orch.sync(None).await);
        assert!(report.degraded.contains(&SyncSlice::History));

        let state = orch.snapshot().await;
        assert_eq!(state.history.len(), 30);
        assert_eq!(state.metrics.monthly_kwh, 3000.0);
    }

    #[tokio::test]
    async fn test_failed_assets_on_new_campus_uses_that_campus_cache() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.select_campus(2).await);
        synced(orch.select_campus(1).await);

        gw.fail_assets.store(true, Ordering::SeqCst);
        let report = synced(orch.select_campus(2).await);
        assert!(report.degraded.contains(&SyncSlice::Assets));

        let state = orch.snapshot().await;
        assert_eq!(state.campus_id, Some(2));
        let names: Vec<_> = state.assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Lab hood", "Server room"]);
    }

    #[tokio::test]
    async fn test_selection_change_mid_sync_discards_stale_responses() {
        let mut gw = gateway();
        gw.delay = Some(Duration::from_millis(40));
        let (orch, _dir) = orchestrator(Arc::new(gw));

        let (first, second) = tokio::join!(orch.sync(None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orch.select_campus(2).await
        });

        assert_eq!(second, SyncOutcome::AlreadySyncing);
        let report = synced(first);
        assert_eq!(report.campus_id, 2);
        assert!(report.discarded_rounds >= 1);

        let state = orch.snapshot().await;
        assert_eq!(state.campus_id, Some(2));
        assert_eq!(state.campus_name(), Some("Sur"));
        assert_eq!(state.assets.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_fails_without_campus_list() {
        let gw = gateway();
        gw.fail_campuses.store(true, Ordering::SeqCst);
        let (orch, _dir) = orchestrator(Arc::new(gw));

        let outcome = orch.sync(None).await;
        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert!(matches!(orch.status().await, SyncStatus::Failed(_)));
        assert!(orch.snapshot().await.campus_id.is_none());
        assert!(!orch.is_syncing());
    }

    #[tokio::test]
    async fn test_sync_with_empty_campus_list_reports_no_campus() {
        let (orch, _dir) = orchestrator(Arc::new(FakeGateway::default()));

        match orch.sync(None).await {
            SyncOutcome::Failed(message) => assert_eq!(message, SyncError::NoCampus.to_string()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_override_does_not_change_selection() {
        let (orch, _dir) = orchestrator(Arc::new(gateway()));
        synced(orch.sync(None).await);

        let report = synced(orch.sync(Some(2)).await);
        assert_eq!(report.campus_id, 2);
        assert_eq!(orch.selected_campus().await, Some(1));
    }

    #[tokio::test]
    async fn test_add_asset_appends_and_caches() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.sync(None).await);

        let added = orch
            .add_asset(NewAsset::new("Pump", AssetType::Hvac, 40.0))
            .await;
        assert!(added);

        let state = orch.snapshot().await;
        assert_eq!(state.assets.len(), 2);
        assert_eq!(state.asset_totals.active_count, 2);
        assert_eq!(orch.cache().load_assets(1).len(), 2);
    }

    #[tokio::test]
    async fn test_add_asset_rejected_leaves_state_untouched() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.sync(None).await);

        gw.fail_create.store(true, Ordering::SeqCst);
        assert!(!orch.add_asset(NewAsset::new("Pump", AssetType::Hvac, 40.0)).await);
        assert_eq!(orch.snapshot().await.assets.len(), 1);

        // Invalid input never reaches the backend
        let before = gw.creates.load(Ordering::SeqCst);
        assert!(!orch.add_asset(NewAsset::new("", AssetType::Hvac, 40.0)).await);
        assert!(!orch.add_asset(NewAsset::new("Bad", AssetType::Hvac, -1.0)).await);
        assert_eq!(gw.creates.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_add_asset_without_campus() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        assert!(!orch.add_asset(NewAsset::new("Pump", AssetType::Hvac, 40.0)).await);
        assert_eq!(gw.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_profile_rederives_and_persists() {
        let gw = FakeGateway {
            campuses: vec![campus(1, "Norte", 14500.0)],
            ..Default::default()
        };
        let (orch, _dir) = orchestrator(Arc::new(gw));
        synced(orch.sync(None).await);
        assert_eq!(orch.snapshot().await.metrics.sources.monthly_kwh, MetricSource::Default);

        let profile = orch
            .update_profile(CampusProfile {
                average_monthly_kwh: Some(8000.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(profile.average_monthly_kwh, Some(8000.0));

        let state = orch.snapshot().await;
        assert_eq!(state.metrics.monthly_kwh, 8000.0);
        assert_eq!(state.metrics.sources.monthly_kwh, MetricSource::Declared);
        assert_eq!(orch.cache().load_profile().average_monthly_kwh, Some(8000.0));
    }

    #[tokio::test]
    async fn test_load_from_cache_restores_last_campus() {
        let dir = TempDir::new().unwrap();
        {
            let cache = LocalCacheStore::new(dir.path().to_path_buf()).unwrap();
            let orch = SyncOrchestrator::new(Arc::new(gateway()), cache, MetricsEngine::default());
            synced(orch.select_campus(2).await);
        }

        let cache = LocalCacheStore::new(dir.path().to_path_buf()).unwrap();
        let offline = FakeGateway::default();
        offline.fail_campuses.store(true, Ordering::SeqCst);
        let orch = SyncOrchestrator::new(Arc::new(offline), cache, MetricsEngine::default());
        orch.load_from_cache().await;

        assert_eq!(orch.selected_campus().await, Some(2));
        let state = orch.snapshot().await;
        assert!(state.from_cache);
        assert_eq!(state.assets.len(), 2);
        assert_eq!(state.history.len(), 10);
        assert_eq!(state.metrics.monthly_kwh, 500.0);
        assert!(!orch.is_cache_stale().await);
    }

    #[tokio::test]
    async fn test_sync_known_campus_survives_campus_list_failure() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCacheStore::new(dir.path().to_path_buf()).unwrap();
        cache.save_selection(2).unwrap();

        let gw = gateway();
        gw.fail_campuses.store(true, Ordering::SeqCst);
        let orch = SyncOrchestrator::new(Arc::new(gw), cache, MetricsEngine::default());
        orch.load_from_cache().await;

        let report = synced(orch.sync(None).await);
        assert_eq!(report.campus_id, 2);
        assert_eq!(orch.snapshot().await.campus_name(), Some("Sur"));
        assert_eq!(orch.campuses().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_assets_on_same_campus_keep_previous_assets() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.sync(None).await);

        gw.fail_assets.store(true, Ordering::SeqCst);
        gw.history.lock().unwrap().insert(1, daily_history(30, 200.0));
        *gw.metrics.lock().unwrap() = Some(BackendMetrics {
            efficiency_score: Some(70.0),
            ..Default::default()
        });

        let report = synced(orch.sync(None).await);
        assert_eq!(report.degraded, vec![SyncSlice::Assets]);

        let state = orch.snapshot().await;
        let names: Vec<_> = state.assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Chiller"]);
        assert_eq!(state.metrics.monthly_kwh, 6000.0);
        assert_eq!(state.metrics.efficiency_score, 70.0);
        assert_eq!(state.metrics.sources.efficiency_score, MetricSource::Backend);
        assert_eq!(orch.cache().load_assets(1).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_metrics_still_refresh_assets_and_history() {
        let gw = gateway();
        *gw.metrics.lock().unwrap() = Some(BackendMetrics {
            monthly_kwh: Some(12000.0),
            ..Default::default()
        });
        let gw = Arc::new(gw);
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.sync(None).await);
        assert_eq!(orch.snapshot().await.metrics.monthly_kwh, 12000.0);

        *gw.metrics.lock().unwrap() = None;
        gw.assets.lock().unwrap().get_mut(&1).unwrap().push(asset(9, "Boiler"));
        gw.history.lock().unwrap().insert(1, daily_history(30, 50.0));

        let report = synced(orch.sync(None).await);
        assert_eq!(report.degraded, vec![SyncSlice::Metrics]);

        let state = orch.snapshot().await;
        assert_eq!(state.assets.len(), 2);
        assert!(state.backend_metrics.is_none());
        assert_eq!(state.metrics.monthly_kwh, 1500.0);
        assert_eq!(state.metrics.sources.monthly_kwh, MetricSource::Measured);
    }

    #[tokio::test]
    async fn test_asset_added_during_sync_survives_publish() {
        let mut gw = gateway();
        gw.delay = Some(Duration::from_millis(50));
        let gw = Arc::new(gw);
        let (orch, _dir) = orchestrator(Arc::clone(&gw));

        let (outcome, added) = tokio::join!(orch.sync(None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orch.add_asset(NewAsset::new("Chiller 2", AssetType::Hvac, 80.0))
                .await
        });
        assert!(added);
        assert_eq!(synced(outcome).campus_id, 1);

        let state = orch.snapshot().await;
        let names: Vec<_> = state.assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Chiller", "Chiller 2"]);
        assert_eq!(orch.cache().load_assets(1).len(), 2);

        // A later fetch includes the asset itself; no duplicate, nothing pending
        synced(orch.sync(None).await);
        assert_eq!(orch.snapshot().await.assets.len(), 2);
        assert!(orch.created.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_selection_change_while_resolving_campus_is_not_published() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCacheStore::new(dir.path().to_path_buf()).unwrap();
        cache.save_selection(2).unwrap();

        let mut gw = gateway();
        gw.campus_delay = Some(Duration::from_millis(40));
        gw.fail_campuses.store(true, Ordering::SeqCst);
        let orch = SyncOrchestrator::new(Arc::new(gw), cache, MetricsEngine::default());
        orch.load_from_cache().await;

        let (first, second) = tokio::join!(orch.sync(None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orch.select_campus(1).await
        });

        assert_eq!(second, SyncOutcome::AlreadySyncing);
        let report = synced(first);
        assert_eq!(report.campus_id, 1);
        assert_eq!(report.discarded_rounds, 1);
        assert_eq!(orch.snapshot().await.campus_name(), Some("Norte"));
        // Campus 2 was never published, so nothing was cached for it
        assert!(orch.cache().load_assets(2).is_empty());
    }

    #[tokio::test]
    async fn test_select_unknown_campus_is_rejected() {
        let gw = Arc::new(gateway());
        let (orch, _dir) = orchestrator(Arc::clone(&gw));
        synced(orch.sync(None).await);
        let fanouts = gw.fanouts.load(Ordering::SeqCst);

        let outcome = orch.select_campus(999).await;
        assert_eq!(
            outcome,
            SyncOutcome::Failed(SyncError::UnknownCampus(999).to_string())
        );
        assert_eq!(orch.selected_campus().await, Some(1));
        assert_eq!(orch.cache().load_selection(), Some(1));
        assert_eq!(gw.fanouts.load(Ordering::SeqCst), fanouts);
    }

    #[tokio::test]
    async fn test_reset_profile_drops_overrides() {
        let gw = FakeGateway {
            campuses: vec![campus(1, "Norte", 14500.0)],
            ..Default::default()
        };
        let (orch, _dir) = orchestrator(Arc::new(gw));
        synced(orch.sync(None).await);
        orch.update_profile(CampusProfile {
            average_monthly_kwh: Some(8000.0),
            ..Default::default()
        })
        .await
        .unwrap();

        orch.reset_profile().await.unwrap();
        assert!(orch.profile().await.is_empty());
        assert!(orch.cache().load_profile().is_empty());
        let state = orch.snapshot().await;
        assert_eq!(state.metrics.sources.monthly_kwh, MetricSource::Default);
    }

    #[tokio::test]
    async fn test_refresh_campuses() {
        let (orch, _dir) = orchestrator(Arc::new(gateway()));
        assert_eq!(orch.refresh_campuses().await.unwrap(), 2);
        assert_eq!(orch.campuses().await.len(), 2);
    }
}
