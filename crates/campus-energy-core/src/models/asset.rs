use serde::{Deserialize, Serialize};

use super::CampusId;

/// Category of a monitored infrastructure unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetType {
    Lighting,
    Hvac,
    ItEquipment,
    Laboratory,
    BuildingBlock,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Lighting => "lighting",
            AssetType::Hvac => "hvac",
            AssetType::ItEquipment => "it_equipment",
            AssetType::Laboratory => "laboratory",
            AssetType::BuildingBlock => "building-block",
        }
    }

    /// Parse a unit type, tolerating the free-form labels stored on the
    /// backend. Anything unrecognised is treated as a building block.
    pub fn from_str(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "lighting" | "light" | "lights" | "iluminacion" => AssetType::Lighting,
            "hvac" | "ac" | "climate" | "chiller" | "climatizacion" => AssetType::Hvac,
            "it_equipment" | "it" | "server" | "servers" | "datacenter" | "data_center" => {
                AssetType::ItEquipment
            }
            "laboratory" | "lab" | "labs" => AssetType::Laboratory,
            _ => AssetType::BuildingBlock,
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AssetType {
    fn from(s: String) -> Self {
        AssetType::from_str(&s)
    }
}

impl From<AssetType> for String {
    fn from(t: AssetType) -> Self {
        t.as_str().to_string()
    }
}

/// A monitored piece of infrastructure, normalized for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Asset {
    pub id: i64,
    pub name: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub asset_type: AssetType,
    /// Average daily consumption in kWh.
    pub consumption: f64,
    pub location: String,
    pub active: bool,
    #[serde(default)]
    pub is_critical: bool,
}

impl Asset {
    pub fn status_label(&self) -> &'static str {
        if self.active {
            "active"
        } else {
            "inactive"
        }
    }
}

/// Attributes for a new asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct NewAsset {
    pub name: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub asset_type: AssetType,
    pub avg_daily_kwh: f64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_critical: bool,
}

impl NewAsset {
    pub fn new(name: impl Into<String>, asset_type: AssetType, avg_daily_kwh: f64) -> Self {
        Self {
            name: name.into(),
            asset_type,
            avg_daily_kwh,
            location: None,
            is_critical: false,
        }
    }

    /// A new asset needs a name and a finite, non-negative consumption.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.avg_daily_kwh.is_finite() && self.avg_daily_kwh >= 0.0
    }

    /// Body for the backend create endpoint.
    pub fn to_create_body(&self) -> InfrastructureCreate<'_> {
        InfrastructureCreate {
            name: &self.name,
            unit_type: self.asset_type.as_str(),
            avg_daily_consumption: self.avg_daily_kwh,
            is_critical: self.is_critical,
            status: true,
        }
    }
}

/// Create request as the backend expects it.
#[derive(Debug, Serialize)]
pub struct InfrastructureCreate<'a> {
    pub name: &'a str,
    pub unit_type: &'a str,
    pub avg_daily_consumption: f64,
    pub is_critical: bool,
    pub status: bool,
}

/// Infrastructure unit as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct InfrastructureUnit {
    pub id: i64,
    #[serde(default)]
    pub campus_id: Option<CampusId>,
    pub name: String,
    #[serde(alias = "asset_type", default)]
    pub unit_type: Option<String>,
    #[serde(default)]
    pub area_sqm: Option<f64>,
    #[serde(default)]
    pub is_critical: Option<bool>,
    #[serde(alias = "avg_daily_kwh", default)]
    pub avg_daily_consumption: Option<f64>,
    #[serde(alias = "location_detail", default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<bool>,
}

impl From<InfrastructureUnit> for Asset {
    fn from(unit: InfrastructureUnit) -> Self {
        let location = unit
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| unit.name.clone());
        Asset {
            id: unit.id,
            asset_type: unit
                .unit_type
                .as_deref()
                .map(AssetType::from_str)
                .unwrap_or(AssetType::BuildingBlock),
            consumption: unit
                .avg_daily_consumption
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            location,
            active: unit.status.unwrap_or(true),
            is_critical: unit.is_critical.unwrap_or(false),
            name: unit.name,
        }
    }
}
