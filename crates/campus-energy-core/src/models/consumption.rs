use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Unit of a consumption reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum ConsumptionUnit {
    #[serde(rename = "kWh", alias = "kwh")]
    Kwh,
    #[serde(rename = "m3")]
    M3,
    #[serde(other)]
    Other,
}

/// One reading of a campus time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ConsumptionRecord {
    pub date: String,
    pub value: f64,
    pub unit: ConsumptionUnit,
}

impl ConsumptionRecord {
    pub fn new(date: impl Into<String>, value: f64, unit: ConsumptionUnit) -> Self {
        Self {
            date: date.into(),
            value,
            unit,
        }
    }

    /// Parse the record date. Accepts RFC 3339, naive ISO timestamps and
    /// plain dates; returns `None` for anything else.
    pub fn parsed_date(&self) -> Option<NaiveDateTime> {
        let s = self.date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    pub fn is_electricity(&self) -> bool {
        self.unit == ConsumptionUnit::Kwh
    }

    pub fn is_water(&self) -> bool {
        self.unit == ConsumptionUnit::M3
    }
}
