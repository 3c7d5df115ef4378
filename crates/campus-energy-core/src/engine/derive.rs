use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{
    BackendMetrics, CampusConfig, ConsumptionRecord, DerivedMetrics, MetricSource, MetricSources,
};

/// Named constants used by the fallback rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConstants {
    /// Tonnes of CO2 per kWh for the regional grid.
    pub emission_factor: f64,
    /// Share of consumption assumed lost to inefficiency.
    pub waste_fraction: f64,
    /// Institutional tariff, currency units per kWh.
    pub unit_price: f64,
    /// Tonnes of CO2 absorbed by one tree per year.
    pub tree_absorption: f64,
    /// Monthly kWh used when nothing better is known.
    pub default_monthly_kwh: f64,
    pub efficiency_high: f64,
    pub efficiency_low: f64,
    /// Score reported when no baseline is available to compare against.
    pub efficiency_unknown: f64,
    /// Number of most recent readings summed into a monthly figure.
    pub history_window: usize,
}

impl Default for MetricsConstants {
    fn default() -> Self {
        Self {
            emission_factor: 0.000126,
            waste_fraction: 0.15,
            unit_price: 850.0,
            tree_absorption: 0.02,
            default_monthly_kwh: 5000.0,
            efficiency_high: 95.0,
            efficiency_low: 82.0,
            efficiency_unknown: 85.0,
            history_window: 30,
        }
    }
}

/// Derives campus metrics from raw inputs.
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine {
    constants: MetricsConstants,
}

impl MetricsEngine {
    pub fn new(constants: MetricsConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &MetricsConstants {
        &self.constants
    }

    /// Compute every metric in one pass.
    ///
    /// Inputs are borrowed immutably; the same inputs always produce the
    /// same output.
    pub fn derive(
        &self,
        backend: Option<&BackendMetrics>,
        history: &[ConsumptionRecord],
        campus: &CampusConfig,
    ) -> DerivedMetrics {
        let c = &self.constants;
        let raw = backend.cloned().unwrap_or_default();
        let ordered = chronological(history);

        let (monthly_kwh, monthly_src) = match present(raw.monthly_kwh) {
            Some(v) => (v, MetricSource::Backend),
            None => match sum_latest(&ordered, c.history_window, ConsumptionRecord::is_electricity) {
                Some(v) => (v, MetricSource::Measured),
                None => match campus.declared_monthly_kwh.filter(|v| v.is_finite()) {
                    Some(v) => (v, MetricSource::Declared),
                    None => (c.default_monthly_kwh, MetricSource::Default),
                },
            },
        };

        let (carbon_footprint_tons, carbon_src) = backend_or(raw.carbon_footprint_tons, || {
            (monthly_kwh * c.emission_factor, monthly_src)
        });

        let (kwh_per_student, per_student_src) = backend_or(raw.kwh_per_student, || {
            let population = campus.population.max(1) as f64;
            (round2(monthly_kwh / population), monthly_src)
        });

        let (energy_intensity_index, intensity_src) = backend_or(raw.energy_intensity_index, || {
            (round2(monthly_kwh / floor_one(campus.area_sqm)), monthly_src)
        });

        let (water_m3, water_src) = backend_or(raw.water_m3, || {
            match sum_latest(&ordered, c.history_window, ConsumptionRecord::is_water) {
                Some(v) => (v, MetricSource::Measured),
                None => (0.0, MetricSource::Default),
            }
        });

        let (efficiency_score, efficiency_src) = backend_or(raw.efficiency_score, || {
            self.efficiency_fallback(monthly_kwh, monthly_src, campus)
        });

        let waste_kwh_monthly = monthly_kwh * c.waste_fraction;

        let (waste_cost_monthly, waste_cost_src) = backend_or(raw.waste_cost_monthly, || {
            (waste_kwh_monthly * c.unit_price, monthly_src)
        });

        let (projected_bill, bill_src) = backend_or(raw.projected_bill, || {
            (monthly_kwh * c.unit_price, monthly_src)
        });

        let (trees_equivalent, trees_src) = backend_or(raw.trees_equivalent, || {
            let trees = if c.tree_absorption > 0.0 {
                (carbon_footprint_tons / c.tree_absorption).round()
            } else {
                0.0
            };
            (trees, carbon_src)
        });

        DerivedMetrics {
            monthly_kwh,
            carbon_footprint_tons,
            kwh_per_student,
            water_m3,
            energy_intensity_index,
            efficiency_score,
            waste_kwh_monthly,
            waste_cost_monthly,
            projected_bill,
            trees_equivalent,
            sources: MetricSources {
                monthly_kwh: monthly_src,
                carbon_footprint_tons: carbon_src,
                kwh_per_student: per_student_src,
                water_m3: water_src,
                energy_intensity_index: intensity_src,
                efficiency_score: efficiency_src,
                waste_kwh_monthly: monthly_src,
                waste_cost_monthly: waste_cost_src,
                projected_bill: bill_src,
                trees_equivalent: trees_src,
            },
        }
    }

    // Two-tier step against the daily baseline scaled to a month.
    fn efficiency_fallback(
        &self,
        monthly_kwh: f64,
        monthly_src: MetricSource,
        campus: &CampusConfig,
    ) -> (f64, MetricSource) {
        let c = &self.constants;
        match campus.baseline_energy_kwh.filter(|b| b.is_finite() && *b > 0.0) {
            Some(baseline) if monthly_kwh <= baseline * 30.0 => (c.efficiency_high, monthly_src),
            Some(_) => (c.efficiency_low, monthly_src),
            None => (c.efficiency_unknown, MetricSource::Default),
        }
    }
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn backend_or(
    value: Option<f64>,
    fallback: impl FnOnce() -> (f64, MetricSource),
) -> (f64, MetricSource) {
    match present(value) {
        Some(v) => (v, MetricSource::Backend),
        None => fallback(),
    }
}

/// Readings ordered oldest first.
///
/// Sorting is stable and readings with unparseable dates sort as oldest,
/// so already-ordered input keeps its order.
fn chronological(history: &[ConsumptionRecord]) -> Vec<&ConsumptionRecord> {
    let mut sorted: Vec<(Option<NaiveDateTime>, &ConsumptionRecord)> =
        history.iter().map(|r| (r.parsed_date(), r)).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted.into_iter().map(|(_, r)| r).collect()
}

/// Sum the latest `window` readings matching `filter`. `None` when no
/// reading matches.
fn sum_latest(
    records: &[&ConsumptionRecord],
    window: usize,
    filter: fn(&ConsumptionRecord) -> bool,
) -> Option<f64> {
    let values: Vec<f64> = records
        .iter()
        .filter(|r| filter(r))
        .map(|r| r.value)
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().rev().take(window.max(1)).sum())
}

fn floor_one(value: f64) -> f64 {
    // f64::max ignores NaN
    value.max(1.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
