use serde::{Deserialize, Serialize};

use super::CampusId;

/// Aggregate metrics as computed by the backend.
///
/// Every field is optional; the backend only reports what it knows.
/// A field counts as present when it holds a finite number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(default)]
pub struct BackendMetrics {
    #[serde(alias = "monthly_consumption_kwh", alias = "projected_kwh")]
    pub monthly_kwh: Option<f64>,
    #[serde(alias = "co2_footprint")]
    pub carbon_footprint_tons: Option<f64>,
    pub kwh_per_student: Option<f64>,
    pub water_m3: Option<f64>,
    pub energy_intensity_index: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub waste_cost_monthly: Option<f64>,
    pub projected_bill: Option<f64>,
    pub trees_equivalent: Option<f64>,
}

impl BackendMetrics {
    /// Fill fields missing here from `fallback`.
    pub fn or(self, fallback: BackendMetrics) -> Self {
        Self {
            monthly_kwh: self.monthly_kwh.or(fallback.monthly_kwh),
            carbon_footprint_tons: self.carbon_footprint_tons.or(fallback.carbon_footprint_tons),
            kwh_per_student: self.kwh_per_student.or(fallback.kwh_per_student),
            water_m3: self.water_m3.or(fallback.water_m3),
            energy_intensity_index: self.energy_intensity_index.or(fallback.energy_intensity_index),
            efficiency_score: self.efficiency_score.or(fallback.efficiency_score),
            waste_cost_monthly: self.waste_cost_monthly.or(fallback.waste_cost_monthly),
            projected_bill: self.projected_bill.or(fallback.projected_bill),
            trees_equivalent: self.trees_equivalent.or(fallback.trees_equivalent),
        }
    }
}

/// Totals block of the dashboard endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardSummary {
    #[serde(default)]
    pub total_campuses: Option<i64>,
    #[serde(flatten)]
    pub metrics: BackendMetrics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardCampus {
    pub id: CampusId,
}

/// Dashboard endpoint response. Every block may be missing.
///
/// `metrics` is always scoped to the requested campus. `summary` covers
/// every campus the user owns, so it only describes a single campus
/// when that campus is the only one listed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardResponse {
    #[serde(default)]
    pub summary: Option<DashboardSummary>,
    #[serde(default)]
    pub metrics: Option<BackendMetrics>,
    #[serde(default)]
    pub campuses: Vec<DashboardCampus>,
}

impl DashboardResponse {
    fn summary_covers(&self, campus_id: CampusId) -> bool {
        let Some(summary) = &self.summary else {
            return false;
        };
        let single = match summary.total_campuses {
            Some(total) => total == 1,
            None => self.campuses.len() == 1,
        };
        single && !self.campuses.is_empty() && self.campuses.iter().all(|c| c.id == campus_id)
    }

    /// Flatten into one set of metrics for `campus_id`, or for the whole
    /// portfolio when `None`. The `metrics` block wins over `summary`.
    pub fn into_metrics(self, campus_id: Option<CampusId>) -> BackendMetrics {
        let use_summary = match campus_id {
            Some(id) => self.summary_covers(id),
            None => true,
        };
        let summary = if use_summary {
            self.summary.map(|s| s.metrics).unwrap_or_default()
        } else {
            BackendMetrics::default()
        };
        self.metrics.unwrap_or_default().or(summary)
    }
}

/// Precedence tier a derived value was taken from, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Backend,
    Measured,
    Declared,
    #[default]
    Default,
}

/// Per-field provenance of a `DerivedMetrics` value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct MetricSources {
    pub monthly_kwh: MetricSource,
    pub carbon_footprint_tons: MetricSource,
    pub kwh_per_student: MetricSource,
    pub water_m3: MetricSource,
    pub energy_intensity_index: MetricSource,
    pub efficiency_score: MetricSource,
    pub waste_kwh_monthly: MetricSource,
    pub waste_cost_monthly: MetricSource,
    pub projected_bill: MetricSource,
    pub trees_equivalent: MetricSource,
}

/// Sustainability and cost indicators for one campus.
///
/// Always produced as a whole by the metrics engine; never patched
/// field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct DerivedMetrics {
    pub monthly_kwh: f64,
    pub carbon_footprint_tons: f64,
    pub kwh_per_student: f64,
    pub water_m3: f64,
    pub energy_intensity_index: f64,
    pub efficiency_score: f64,
    pub waste_kwh_monthly: f64,
    pub waste_cost_monthly: f64,
    pub projected_bill: f64,
    pub trees_equivalent: f64,
    pub sources: MetricSources,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Body returned by the global dashboard endpoint for two campuses.
    const GLOBAL_DASHBOARD: &str = r#"{
        "summary": {"total_campuses": 2, "total_students": 100, "total_area_sqm": 5000.0,
                    "monthly_consumption_kwh": 459000.0, "carbon_footprint_tons": 57.834},
        "campuses": [
            {"id": 1, "name": "Norte", "city": "Tunja", "students": 100, "status": "Optimal"},
            {"id": 2, "name": "Sur", "city": "Duitama", "students": 0, "status": "Optimal"}
        ]}"#;

    #[test]
    fn test_portfolio_summary_used_without_campus() {
        let metrics = serde_json::from_str::<DashboardResponse>(GLOBAL_DASHBOARD)
            .expect("parse")
            .into_metrics(None);
        assert_eq!(metrics.monthly_kwh, Some(459000.0));
        assert_eq!(metrics.carbon_footprint_tons, Some(57.834));
        assert_eq!(metrics.efficiency_score, None);
    }

    #[test]
    fn test_portfolio_summary_ignored_for_one_campus() {
        let metrics = serde_json::from_str::<DashboardResponse>(GLOBAL_DASHBOARD)
            .expect("parse")
            .into_metrics(Some(1));
        assert_eq!(metrics, BackendMetrics::default());
    }

    #[test]
    fn test_single_campus_summary_applies_to_that_campus() {
        let json = r#"{"summary": {"total_campuses": 1, "monthly_consumption_kwh": 435000.0},
                       "campuses": [{"id": 7}]}"#;
        let response = serde_json::from_str::<DashboardResponse>(json).expect("parse");
        assert_eq!(response.clone().into_metrics(Some(7)).monthly_kwh, Some(435000.0));
        assert_eq!(response.into_metrics(Some(8)).monthly_kwh, None);
    }

    #[test]
    fn test_dashboard_metrics_block_wins() {
        let json = r#"{"summary": {"total_campuses": 1, "monthly_consumption_kwh": 1000.0, "projected_bill": 5.0},
                       "metrics": {"projected_kwh": 2000.0, "co2_footprint": 0.3, "efficiency_score": null},
                       "campuses": [{"id": 3}]}"#;
        let metrics = serde_json::from_str::<DashboardResponse>(json)
            .expect("parse")
            .into_metrics(Some(3));
        assert_eq!(metrics.monthly_kwh, Some(2000.0));
        assert_eq!(metrics.carbon_footprint_tons, Some(0.3));
        assert_eq!(metrics.projected_bill, Some(5.0));
        assert_eq!(metrics.efficiency_score, None);
    }

    #[test]
    fn test_campus_metrics_block_kept_when_summary_is_portfolio_wide() {
        let json = r#"{"summary": {"total_campuses": 4, "monthly_consumption_kwh": 9000.0},
                       "metrics": {"efficiency_score": 88.0}}"#;
        let metrics = serde_json::from_str::<DashboardResponse>(json)
            .expect("parse")
            .into_metrics(Some(3));
        assert_eq!(metrics.efficiency_score, Some(88.0));
        assert_eq!(metrics.monthly_kwh, None);
    }

    #[test]
    fn test_metric_source_ordering() {
        assert!(MetricSource::Backend < MetricSource::Measured);
        assert!(MetricSource::Declared < MetricSource::Default);
    }
}
