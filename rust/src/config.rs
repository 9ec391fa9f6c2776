use std::path::Path;

use serde::Deserialize;

const DEFAULT_STALE_AFTER_SECS: u64 = 60;
const DEFAULT_EVENTS_CAPACITY: usize = 256;

/// Tuning knobs for the cache. Loaded from the host app's data directory
/// when present; every field has a usable default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a fetched list is refetched on next access.
    pub stale_after_secs: u64,
    /// Buffer size of the store/stream event channels. Slow subscribers
    /// past this depth observe a lag error, never a blocked merge.
    pub events_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub(crate) fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }
}

pub fn load_cache_config(path: &Path) -> CacheConfig {
    let Ok(bytes) = std::fs::read(path) else {
        return CacheConfig::default();
    };
    serde_json::from_slice::<CacheConfig>(&bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{load_cache_config, CacheConfig};

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_cache_config(&dir.path().join("absent.json"));
        assert_eq!(config.stale_after_secs, CacheConfig::default().stale_after_secs);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache_config.json");
        std::fs::write(&path, r#"{"stale_after_secs": 5}"#).unwrap();
        let config = load_cache_config(&path);
        assert_eq!(config.stale_after_secs, 5);
        assert_eq!(config.events_capacity, CacheConfig::default().events_capacity);
    }
}
