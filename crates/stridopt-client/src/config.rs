//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use stridopt_shared::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_STEP_MS};
use stridopt_shared::ThemeMode;
use stridopt_sync::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding the local session cache.
    /// Env: `STRIDOPT_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Directory for blobs when no hosted object storage is configured.
    /// Env: `STRIDOPT_BLOB_DIR`
    /// Default: `./blobs`
    pub blob_dir: PathBuf,

    /// Consecutive subscription failures before the error becomes terminal.
    /// Env: `STRIDOPT_RETRY_ATTEMPTS`
    pub retry_attempts: u32,

    /// Backoff unit; the wait after the n-th failure is `n * step`.
    /// Env: `STRIDOPT_RETRY_STEP_MS`
    pub retry_step: Duration,

    /// Env: `STRIDOPT_THEME` (`light` / `dark`)
    pub theme: ThemeMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            blob_dir: PathBuf::from("./blobs"),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_step: Duration::from_millis(DEFAULT_RETRY_STEP_MS),
            theme: ThemeMode::Light,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Invalid values are logged
    /// and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("STRIDOPT_DATA_DIR").filter(|v| !v.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(dir) = lookup("STRIDOPT_BLOB_DIR").filter(|v| !v.is_empty()) {
            config.blob_dir = PathBuf::from(dir);
        }

        if let Some(val) = lookup("STRIDOPT_RETRY_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.retry_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid STRIDOPT_RETRY_ATTEMPTS, using default"),
            }
        }

        if let Some(val) = lookup("STRIDOPT_RETRY_STEP_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.retry_step = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid STRIDOPT_RETRY_STEP_MS, using default"),
            }
        }

        if let Some(val) = lookup("STRIDOPT_THEME") {
            match val.parse::<ThemeMode>() {
                Ok(theme) => config.theme = theme,
                Err(e) => tracing::warn!(error = %e, "Invalid STRIDOPT_THEME, using default"),
            }
        }

        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_step)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.theme, ThemeMode::Light);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("STRIDOPT_DATA_DIR", "/tmp/stridopt"),
            ("STRIDOPT_RETRY_ATTEMPTS", "5"),
            ("STRIDOPT_RETRY_STEP_MS", "250"),
            ("STRIDOPT_THEME", "Dark"),
        ]));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/stridopt")));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().delay_after(2), Duration::from_millis(500));
        assert!(config.theme.is_dark());
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("STRIDOPT_RETRY_ATTEMPTS", "0"),
            ("STRIDOPT_RETRY_STEP_MS", "soon"),
            ("STRIDOPT_THEME", "sepia"),
        ]));
        assert_eq!(config.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(config.retry_step, Duration::from_millis(DEFAULT_RETRY_STEP_MS));
        assert_eq!(config.theme, ThemeMode::Light);
    }
}
