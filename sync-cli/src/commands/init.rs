//! Initialize device identity.

use anyhow::Result;
use std::path::Path;

use crate::config::DeviceConfig;

/// Run the init command.
pub async fn run(data_dir: &Path, name: &str, avatar: Option<&str>) -> Result<()> {
    if DeviceConfig::exists(data_dir).await {
        anyhow::bail!(
            "Device already initialized. Delete {} to reinitialize.",
            data_dir.join("device.json").display()
        );
    }

    let mut config = DeviceConfig::new(name);
    config.avatar_ref = avatar.map(str::to_string);
    config.save(data_dir).await?;

    println!("Device initialized successfully!");
    println!();
    println!("  Peer ID:  {}", config.peer_id);
    println!("  Name:     {}", config.display_name);
    println!("  Data dir: {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Host a game:  tablesync host --name \"Friday game\"");
    println!("  2. Or join one:  tablesync join <CODE>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_creates_device_config() {
        let dir = tempdir().unwrap();
        run(dir.path(), "Ada", Some("dragon")).await.unwrap();

        assert!(dir.path().join("device.json").exists());

        let config = DeviceConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.display_name, "Ada");
        assert_eq!(config.avatar_ref.as_deref(), Some("dragon"));
        assert!(!config.peer_id.is_empty());
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let dir = tempdir().unwrap();
        run(dir.path(), "Device 1", None).await.unwrap();
        assert!(run(dir.path(), "Device 2", None).await.is_err());
    }
}
