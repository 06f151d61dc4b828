//! Configuration management for tablesync.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use sync_client::{PeerId, SessionConfig};

/// Device identity stored locally.
///
/// The peer id doubles as the device's bearer credential, so a host that
/// re-runs `resume` from the same data directory reclaims its own lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Stable peer id.
    pub peer_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Optional avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// When the device was initialized.
    pub created_at: u64,
}

impl DeviceConfig {
    /// Create a new device configuration.
    pub fn new(name: &str) -> Self {
        Self {
            peer_id: PeerId::random().to_string(),
            display_name: name.to_string(),
            avatar_ref: None,
            created_at: now_secs(),
        }
    }

    /// Load device configuration from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("device.json");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Device not initialized. Run 'tablesync init' first.")?;
        serde_json::from_str(&contents).context("Invalid device configuration")
    }

    /// Save device configuration to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join("device.json");
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save device configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if device is initialized.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join("device.json").exists()
    }

    /// Session configuration for the relay at `relay_url`.
    pub fn session_config(&self, relay_url: &str) -> SessionConfig {
        let config = SessionConfig::new(relay_url)
            .with_peer_id(PeerId::new(self.peer_id.clone()))
            .with_credential(&self.peer_id)
            .with_display_name(&self.display_name);
        match &self.avatar_ref {
            Some(avatar) => config.with_avatar_ref(avatar),
            None => config,
        }
    }
}

/// Unix seconds (0 if the clock is before the epoch).
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn device_config_roundtrip() {
        let dir = tempdir().unwrap();
        let config = DeviceConfig::new("Ada");
        config.save(dir.path()).await.unwrap();

        let loaded = DeviceConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.peer_id, config.peer_id);
        assert_eq!(loaded.display_name, "Ada");
        assert!(DeviceConfig::exists(dir.path()).await);
    }

    #[tokio::test]
    async fn missing_device_config_explains_init() {
        let dir = tempdir().unwrap();
        let err = DeviceConfig::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("tablesync init"));
    }

    #[test]
    fn session_config_uses_peer_id_as_credential() {
        let mut device = DeviceConfig::new("Ada");
        device.avatar_ref = Some("dragon".into());
        let config = device.session_config("http://relay:8787/");

        assert_eq!(config.relay_url, "http://relay:8787");
        assert_eq!(config.peer_id.as_str(), device.peer_id);
        assert_eq!(config.credential, device.peer_id);
        assert_eq!(config.display_name, "Ada");
        assert_eq!(config.avatar_ref.as_deref(), Some("dragon"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn device_config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        DeviceConfig::new("Ada").save(dir.path()).await.unwrap();

        let path = dir.path().join("device.json");
        let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
