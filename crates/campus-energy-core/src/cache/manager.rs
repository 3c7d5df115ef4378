use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Asset, CampusId, CampusProfile, ConsumptionRecord};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const PROFILE_KEY: &str = "campus_profile";
const SELECTION_KEY: &str = "selected_campus";
const PREFERENCES_KEY: &str = "preferences";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// Preferences shared with the view layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Option<String>,
    pub notifications_enabled: bool,
}

/// Durable key-value store backed by one JSON file per key.
///
/// Reads never fail: a missing, unreadable or corrupt entry loads as
/// `None`. Writes report their errors to the caller.
pub struct LocalCacheStore {
    cache_dir: PathBuf,
}

impl LocalCacheStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {:?}", cache_dir))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", key))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", key))?;

        Ok(Some(cached))
    }

    /// Load an entry together with its timestamp.
    pub fn load_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        match self.read(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache = key, error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.load_entry(key).map(|cached| cached.data)
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let cached = CachedData::new(value);
        let contents = serde_json::to_string_pretty(&cached)?;
        // Write then rename: readers never see a half-written entry
        let tmp = self.cache_dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache file: {}", key))?;
        std::fs::rename(&tmp, self.cache_path(key))
            .with_context(|| format!("Failed to replace cache file: {}", key))?;
        debug!(cache = key, "Cache entry written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.cache_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    // ===== Assets =====

    fn assets_key(campus_id: CampusId) -> String {
        format!("assets_{}", campus_id)
    }

    pub fn load_assets(&self, campus_id: CampusId) -> Vec<Asset> {
        self.load(&Self::assets_key(campus_id)).unwrap_or_default()
    }

    pub fn save_assets(&self, campus_id: CampusId, assets: &[Asset]) -> Result<()> {
        self.save(&Self::assets_key(campus_id), assets)
    }

    // ===== Consumption History =====

    fn history_key(campus_id: CampusId) -> String {
        format!("history_{}", campus_id)
    }

    pub fn load_history(&self, campus_id: CampusId) -> Vec<ConsumptionRecord> {
        self.load(&Self::history_key(campus_id)).unwrap_or_default()
    }

    pub fn save_history(&self, campus_id: CampusId, history: &[ConsumptionRecord]) -> Result<()> {
        self.save(&Self::history_key(campus_id), history)
    }

    // ===== Campus Profile =====

    pub fn load_profile(&self) -> CampusProfile {
        self.load(PROFILE_KEY).unwrap_or_default()
    }

    pub fn save_profile(&self, profile: &CampusProfile) -> Result<()> {
        self.save(PROFILE_KEY, profile)
    }

    pub fn clear_profile(&self) -> Result<()> {
        self.remove(PROFILE_KEY)
    }

    // ===== Selection =====

    pub fn load_selection(&self) -> Option<CampusId> {
        self.load(SELECTION_KEY)
    }

    pub fn save_selection(&self, campus_id: CampusId) -> Result<()> {
        self.save(SELECTION_KEY, &campus_id)
    }

    // ===== Preferences =====

    pub fn load_preferences(&self) -> Preferences {
        self.load(PREFERENCES_KEY).unwrap_or_default()
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        self.save(PREFERENCES_KEY, preferences)
    }

    // ===== Cache Age Information =====

    fn age_of(&self, key: &str) -> Option<String> {
        self.load_entry::<serde_json::Value>(key)
            .map(|cached| cached.age_display())
    }

    fn is_key_stale(&self, key: &str) -> bool {
        match self.load_entry::<serde_json::Value>(key) {
            Some(cached) => cached.is_stale(),
            None => true, // No cache = stale
        }
    }

    pub fn get_cache_ages(&self, campus_id: Option<CampusId>) -> CacheAges {
        CacheAges {
            assets: campus_id.and_then(|id| self.age_of(&Self::assets_key(id))),
            history: campus_id.and_then(|id| self.age_of(&Self::history_key(id))),
            profile: self.age_of(PROFILE_KEY),
        }
    }

    /// Check if the campus data cached for `campus_id` is stale
    pub fn any_stale(&self, campus_id: CampusId) -> bool {
        self.is_key_stale(&Self::assets_key(campus_id))
            || self.is_key_stale(&Self::history_key(campus_id))
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheAges {
    pub assets: Option<String>,
    pub history: Option<String>,
    pub profile: Option<String>,
}

impl CacheAges {
    /// Returns the first known age across cache types
    pub fn last_updated(&self) -> String {
        [&self.assets, &self.history, &self.profile]
            .into_iter()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_else(|| "never".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
