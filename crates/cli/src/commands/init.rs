use std::path::Path;

use beacon_core::config::BeaconConfig;
use tracing::info;

/// Run the `init` command: write a default configuration file.
pub async fn run(config_path: &str, force: bool) -> anyhow::Result<()> {
    let path = Path::new(config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let config = BeaconConfig::generate_default();
    std::fs::write(path, config.to_toml()?)?;
    info!("Wrote configuration to {}", path.display());

    println!("Beacon initialized successfully!");
    println!("  Configuration: {}", path.display());
    println!("  Endpoint:      {}", config.telemetry.events_base_url());
    println!();
    println!("Next steps:");
    println!(
        "  1. Set telemetry.access_token in {} to your access token",
        path.display()
    );
    println!("  2. Run `beacon status` to check the configuration");
    println!("  3. Run `beacon replay <file>` to send recorded events");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("beacon.toml");
        let path_str = path.to_string_lossy().to_string();

        run(&path_str, false).await.unwrap();

        let config = BeaconConfig::load(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.telemetry.access_token, "pk.replace-me");
        assert_eq!(config.telemetry.queue.capacity, 1000);
        assert_eq!(config.telemetry.flush.period_secs, 180);
    }

    #[tokio::test]
    async fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.toml");
        std::fs::write(&path, "# keep me").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let err = run(&path_str, false).await.unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# keep me");

        run(&path_str, true).await.unwrap();
        assert!(BeaconConfig::load(&path).is_ok());
    }
}
