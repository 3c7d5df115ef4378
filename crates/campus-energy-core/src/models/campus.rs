use serde::{Deserialize, Deserializer, Serialize};

/// Backend identifier of a campus.
pub type CampusId = i64;

/// Operational status of a campus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum CampusStatus {
    #[default]
    Online,
    Warning,
    Maintenance,
}

impl CampusStatus {
    /// Parse a status string, tolerating the labels the backend emits
    /// ("Optimal", "degraded", ...). Unknown or missing values are online.
    pub fn from_str(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_lowercase()) {
            Some(s) if s.contains("maint") => CampusStatus::Maintenance,
            Some(s) if s.contains("warn") || s.contains("degrad") || s.contains("alert") => {
                CampusStatus::Warning
            }
            _ => CampusStatus::Online,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampusStatus::Online => "online",
            CampusStatus::Warning => "warning",
            CampusStatus::Maintenance => "maintenance",
        }
    }
}

fn lenient_status<'de, D>(deserializer: D) -> Result<CampusStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(CampusStatus::from_str(raw.as_deref()))
}

/// One physical institutional site, as registered on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Campus {
    pub id: CampusId,
    pub name: String,
    #[serde(rename = "location_city", alias = "city", default)]
    pub city: Option<String>,
    #[serde(default)]
    pub population_students: Option<i64>,
    #[serde(default)]
    pub population_staff: Option<i64>,
    #[serde(default)]
    pub total_area_sqm: Option<f64>,
    /// Daily baseline consumption in kWh.
    #[serde(default)]
    pub baseline_energy_kwh: Option<f64>,
    #[serde(default)]
    pub primary_usage: Option<String>,
    #[serde(default)]
    pub target_reduction_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: CampusStatus,
}

impl Campus {
    pub fn display_city(&self) -> &str {
        self.city.as_deref().unwrap_or("-")
    }
}

/// Locally cached, user-editable subset of campus attributes.
///
/// Every field is optional; a `Some` in an update replaces the stored
/// value, a `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct CampusProfile {
    pub name: Option<String>,
    pub city: Option<String>,
    pub total_area_sqm: Option<f64>,
    pub population_students: Option<i64>,
    /// Declared (or meter-captured) average monthly consumption in kWh.
    pub average_monthly_kwh: Option<f64>,
}

impl CampusProfile {
    pub fn merge(&mut self, patch: CampusProfile) {
        if patch.name.is_some() {
            self.name = patch.name;
        }
        if patch.city.is_some() {
            self.city = patch.city;
        }
        if patch.total_area_sqm.is_some() {
            self.total_area_sqm = patch.total_area_sqm;
        }
        if patch.population_students.is_some() {
            self.population_students = patch.population_students;
        }
        if patch.average_monthly_kwh.is_some() {
            self.average_monthly_kwh = patch.average_monthly_kwh;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CampusProfile::default()
    }
}

/// Campus attributes as seen by the metrics engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampusConfig {
    pub name: Option<String>,
    pub population: i64,
    pub area_sqm: f64,
    /// Daily baseline in kWh, if known.
    pub baseline_energy_kwh: Option<f64>,
    pub declared_monthly_kwh: Option<f64>,
}

impl CampusConfig {
    /// Combine backend campus data with the local profile.
    ///
    /// Backend values win when present and positive; the profile fills
    /// whatever the backend left out.
    pub fn resolve(campus: Option<&Campus>, profile: &CampusProfile) -> Self {
        let name = campus
            .map(|c| c.name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| profile.name.clone());

        let population = campus
            .and_then(|c| c.population_students)
            .filter(|p| *p > 0)
            .or(profile.population_students)
            .unwrap_or(0);

        let area_sqm = positive(campus.and_then(|c| c.total_area_sqm))
            .or(profile.total_area_sqm)
            .unwrap_or(0.0);

        Self {
            name,
            population,
            area_sqm,
            baseline_energy_kwh: positive(campus.and_then(|c| c.baseline_energy_kwh)),
            declared_monthly_kwh: positive(profile.average_monthly_kwh),
        }
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}
