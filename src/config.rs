use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SERVER_VERSION: &str = "3.3.4";

fn default_command_timeout_secs() -> u64 {
    30
}

/// Bridge settings, resolved once when the bridge is constructed.
///
/// `server_version` must match the pushed jar byte for byte: the
/// device-side server compares its first positional argument against its
/// own version string and exits on mismatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub adb_path: String,
    pub server_path: Option<String>,
    pub server_version: String,
    /// Route tap/swipe/long-press/drag through the control channel when a
    /// session is ready. Off by default: the device-side server drops
    /// touch events until its position mapper is primed by the encoder,
    /// so the adb `input` path is the reliable one.
    #[serde(default)]
    pub prefer_scrcpy_touch: bool,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            server_path: None,
            server_version: DEFAULT_SERVER_VERSION.to_string(),
            prefer_scrcpy_touch: false,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `ADB_PATH`, `SCRCPY_SERVER_PATH` and
    /// `SCRCPY_SERVER_VERSION` from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("ADB_PATH") {
            let normalized = normalize_command_path(&value);
            if !normalized.is_empty() {
                config.adb_path = normalized;
            }
        }
        if let Ok(value) = std::env::var("SCRCPY_SERVER_PATH") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                config.server_path = Some(trimmed.to_string());
            }
        }
        if let Ok(value) = std::env::var("SCRCPY_SERVER_VERSION") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                config.server_version = trimmed.to_string();
            }
        }
        config
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

/// Strip one layer of wrapping quotes; configured paths tend to arrive
/// copy-pasted from shells.
pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_pinned_version() {
        let config = BridgeConfig::default();
        assert_eq!(config.adb_path, "adb");
        assert_eq!(config.server_version, "3.3.4");
        assert!(!config.prefer_scrcpy_touch);
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn normalize_command_path_strips_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/platform-tools/adb\"  "),
            "/opt/platform-tools/adb"
        );
        assert_eq!(normalize_command_path("'adb'"), "adb");
        assert_eq!(normalize_command_path("adb"), "adb");
    }
}
