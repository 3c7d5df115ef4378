//! Secondary figures shown next to the derived metrics.

use serde::{Deserialize, Serialize};

use crate::models::Asset;

/// Share of monthly consumption attributed to one load category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LoadShare {
    pub name: String,
    pub kwh: f64,
}

/// Fixed split of institutional load across zones.
const LOAD_SPLIT: [(&str, f64); 4] = [
    ("Lighting", 0.25),
    ("HVAC", 0.35),
    ("IT equipment", 0.30),
    ("Other", 0.10),
];

/// Estimate how monthly consumption breaks down by load category.
pub fn load_distribution(monthly_kwh: f64) -> Vec<LoadShare> {
    LOAD_SPLIT
        .iter()
        .map(|(name, share)| LoadShare {
            name: name.to_string(),
            kwh: monthly_kwh * share,
        })
        .collect()
}

/// Totals over the asset inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AssetTotals {
    /// Sum of average daily kWh over active assets.
    pub total_nominal_kwh: f64,
    pub active_count: usize,
    pub estimated_monthly_cost: f64,
}

pub fn asset_totals(assets: &[Asset], unit_price: f64) -> AssetTotals {
    let active: Vec<&Asset> = assets.iter().filter(|a| a.active).collect();
    let total_nominal_kwh: f64 = active
        .iter()
        .map(|a| a.consumption)
        .filter(|v| v.is_finite())
        .sum();
    AssetTotals {
        total_nominal_kwh,
        active_count: active.len(),
        estimated_monthly_cost: total_nominal_kwh * 30.0 * unit_price,
    }
}
