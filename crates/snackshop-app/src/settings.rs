//! Settings file persistence.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether the platform exposes an app-icon badge surface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_available: Option<bool>,
}

pub fn settings_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

/// Read settings from file. Returns defaults if the file doesn't exist.
/// Returns `Err` if the file exists but cannot be parsed (to avoid silent
/// data loss).
pub fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(settings)
}

/// Write settings atomically (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("snackshop-settings-{tag}-{nanos}"))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = scratch_dir("missing").join("settings.json");
        let settings = read_settings(&path).unwrap();
        assert!(settings.auth_token.is_none());
        assert!(settings.user_id.is_none());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = scratch_dir("roundtrip");
        let path = settings_file_path(&dir);
        let settings = Settings {
            api_url: Some("http://localhost:4000/api".into()),
            auth_token: Some("token-1".into()),
            user_id: Some("u1".into()),
            badge_available: Some(true),
        };
        write_settings(&path, &settings).unwrap();

        let back = read_settings(&path).unwrap();
        assert_eq!(back.auth_token.as_deref(), Some("token-1"));
        assert_eq!(back.user_id.as_deref(), Some("u1"));
        assert_eq!(back.badge_available, Some(true));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = settings_file_path(&dir);
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_settings(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
