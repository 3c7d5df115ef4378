//! Local caching module for offline data access.
//!
//! This module provides `LocalCacheStore` for storing and retrieving
//! campus data locally. Entries are JSON files stamped with the time they
//! were written and considered stale after 60 minutes.
//!
//! Cached data types include:
//! - Asset inventory and consumption history per campus
//! - Campus profile (user-editable overrides)
//! - Last campus selection
//! - UI preferences (theme, notifications)

pub mod manager;

pub use manager::{CacheAges, CachedData, LocalCacheStore, Preferences};
