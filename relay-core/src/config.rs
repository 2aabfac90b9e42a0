//! # Relay Configuration
//!
//! A minimal string key/value store with typed reads on a snapshot.
//!
//! ```rust
//! use relay_core::RelayConfig;
//! let mut cfg = RelayConfig::new();
//!
//! cfg.set("fallback.mode", "strict");
//! cfg.set("tenants.cache_ttl_ms", "5000");
//!
//! let snap = cfg.snapshot();
//! assert_eq!(snap.get("fallback.mode"), Some("strict"));
//! assert_eq!(snap.get_u64("tenants.cache_ttl_ms"), Some(5000));
//! ```
//!
//! ## Environment overrides
//! `RelayConfig::from_env("RELAY__")` maps every variable carrying the
//! prefix onto a dotted key:
//!
//! ```bash
//! export RELAY__HTTP__PORT=3040        # http.port
//! export RELAY__FALLBACK__MODE=strict  # fallback.mode
//! ```

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct RelayConfig {
    values: HashMap<String, String>,
}

impl RelayConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Load every `PREFIX...` environment variable.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`RelayConfig::from_env`] over an explicit variable list.
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cfg = Self::new();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                cfg.set(normalized, value);
            }
        }
        cfg
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only when it is not present yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> RelayConfigSnapshot {
        RelayConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayConfigSnapshot {
    map: HashMap<String, String>,
}

impl RelayConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Milliseconds value as a `Duration`.
    pub fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }

    /// Comma separated list, empty entries dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|v| {
            v.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_become_dotted_keys() {
        let vars = vec![
            ("RELAY__HTTP__PORT".to_string(), "3040".to_string()),
            ("RELAY__FALLBACK__MODE".to_string(), "strict".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let cfg = RelayConfig::from_vars("RELAY__", vars);

        assert_eq!(cfg.get("http.port"), Some("3040"));
        assert_eq!(cfg.get("fallback.mode"), Some("strict"));
        assert!(!cfg.has("path"));
    }

    #[test]
    fn set_default_does_not_override() {
        let mut cfg = RelayConfig::new();
        cfg.set("http.port", "9000");
        cfg.set_default("http.port", "3040");
        cfg.set_default("http.host", "127.0.0.1");

        let snap = cfg.snapshot();
        assert_eq!(snap.get_u64("http.port"), Some(9000));
        assert_eq!(snap.get("http.host"), Some("127.0.0.1"));
    }

    #[test]
    fn typed_getters() {
        let mut cfg = RelayConfig::new();
        cfg.set("ttl", "250");
        cfg.set("flag", "true");
        cfg.set("list", "a, b,,c");
        let snap = cfg.snapshot();

        assert_eq!(snap.get_duration_ms("ttl"), Some(Duration::from_millis(250)));
        assert_eq!(snap.get_bool("flag"), Some(true));
        assert_eq!(snap.get_list("list").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(snap.get_u64("flag"), None);
    }
}
