//! Display formatting helpers.

pub mod format;

pub use format::{format_cop, format_kwh, format_percent, truncate_string};
