use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Synchronization engine configuration
/// In debug builds: loads a .env file first, then reads PLAYSYNC_* variables
/// In release builds: reads PLAYSYNC_* variables only
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// How often the local position is checkpointed while playing
    pub local_checkpoint_interval: Duration,
    /// How often a remote push is attempted while playing
    pub remote_sync_interval: Duration,
    /// Minimum time between two remote pushes for the same track
    pub remote_throttle_window: Duration,
    /// Directory of the on-device position store
    pub store_dir: PathBuf,
    /// Base URL of the remote position API (None disables the HTTP service)
    pub remote_base_url: Option<String>,
    pub remote_auth_token: Option<String>,
    /// Name shown by the OS media controls
    pub media_controls_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let store_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".playsync")
            .join("positions");

        SyncConfig {
            local_checkpoint_interval: Duration::from_secs(1),
            remote_sync_interval: Duration::from_secs(15),
            remote_throttle_window: Duration::from_secs(10),
            store_dir,
            remote_base_url: None,
            remote_auth_token: None,
            media_controls_name: "playsync".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration based on build mode
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: Dev mode activated - loaded .env file");
            } else {
                info!("Config: No .env file found, using environment only");
            }
        }

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from a variable lookup, falling back to defaults
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SyncConfig::default();

        if let Some(dir) = lookup("PLAYSYNC_STORE_DIR").filter(|v| !v.trim().is_empty()) {
            config.store_dir = PathBuf::from(dir);
        }
        config.remote_base_url = lookup("PLAYSYNC_REMOTE_URL").filter(|v| !v.trim().is_empty());
        config.remote_auth_token =
            lookup("PLAYSYNC_REMOTE_TOKEN").filter(|v| !v.trim().is_empty());

        if let Some(interval) = millis(&lookup, "PLAYSYNC_LOCAL_INTERVAL_MS") {
            config.local_checkpoint_interval = interval;
        }
        if let Some(interval) = millis(&lookup, "PLAYSYNC_REMOTE_INTERVAL_MS") {
            config.remote_sync_interval = interval;
        }
        if let Some(window) = millis(&lookup, "PLAYSYNC_THROTTLE_MS") {
            config.remote_throttle_window = window;
        }
        if let Some(name) = lookup("PLAYSYNC_MEDIA_NAME").filter(|v| !v.trim().is_empty()) {
            config.media_controls_name = name;
        }

        match &config.remote_base_url {
            Some(url) => info!("Config: Remote position service at {}", url),
            None => info!("Config: No remote position service configured"),
        }

        config
    }
}

/// Parse a positive millisecond duration; anything else is ignored with a warning
fn millis<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!("Config: Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_vars(lookup(&[]));
        assert_eq!(config.local_checkpoint_interval, Duration::from_secs(1));
        assert_eq!(config.remote_sync_interval, Duration::from_secs(15));
        assert_eq!(config.remote_throttle_window, Duration::from_secs(10));
        assert!(config.remote_base_url.is_none());
        assert!(config.store_dir.ends_with(".playsync/positions"));
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_vars(lookup(&[
            ("PLAYSYNC_STORE_DIR", "/tmp/positions"),
            ("PLAYSYNC_REMOTE_URL", "https://api.example.com"),
            ("PLAYSYNC_REMOTE_TOKEN", "secret"),
            ("PLAYSYNC_REMOTE_INTERVAL_MS", "30000"),
        ]));
        assert_eq!(config.store_dir, PathBuf::from("/tmp/positions"));
        assert_eq!(config.remote_base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.remote_auth_token.as_deref(), Some("secret"));
        assert_eq!(config.remote_sync_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_interval_falls_back() {
        let config = SyncConfig::from_vars(lookup(&[
            ("PLAYSYNC_LOCAL_INTERVAL_MS", "soon"),
            ("PLAYSYNC_THROTTLE_MS", "0"),
        ]));
        assert_eq!(config.local_checkpoint_interval, Duration::from_secs(1));
        assert_eq!(config.remote_throttle_window, Duration::from_secs(10));
    }
}
