//! The daemon's own run-time settings: socket paths for the virtual-HID
//! transport, the device name, and the log level. A missing file falls
//! back to defaults rather than erroring, since a first run has nothing
//! to load yet.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub log_level: String,
    pub socket_dir: PathBuf,
    pub device_name: String,
    pub endpoint_id: u32,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            socket_dir: PathBuf::from("/tmp/remapd"),
            device_name: "remapd virtual device".to_string(),
            endpoint_id: 1,
        }
    }
}

impl DaemonSettings {
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&text)?;
        Ok(settings)
    }

    pub fn datagram_path(&self) -> PathBuf {
        self.socket_dir.join("remapd.dgram")
    }

    pub fn stream_path(&self) -> PathBuf {
        self.socket_dir.join("remapd.stream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_file_falls_back_to_defaults() {
        let settings = DaemonSettings::load_or_default(Some(Path::new("/nonexistent/remapd.toml"))).unwrap();
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn no_path_falls_back_to_defaults() {
        let settings = DaemonSettings::load_or_default(None).unwrap();
        assert_eq!(settings.device_name, "remapd virtual device");
    }
}
