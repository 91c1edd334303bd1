pub mod init;
pub mod replay;
pub mod status;
pub mod toggle;

use std::path::Path;
use std::sync::Arc;

use beacon_core::config::{BeaconConfig, TelemetryConfig};
use beacon_telemetry::{
    Collaborators, FilePreferenceStore, HttpTransmissionClient, StaticConnectivity, StaticDevice,
    StaticManifest, StaticPermission, TelemetryController,
};
use tokio::runtime::Handle;
use tracing::info;

/// Load and validate the configuration file.
pub(crate) fn load_config(config_path: &str) -> anyhow::Result<BeaconConfig> {
    let config = BeaconConfig::load(Path::new(config_path))?;
    config.validate()?;
    info!("Loaded configuration from {}", config_path);
    Ok(config)
}

/// Controller wired to the HTTP transport and file-backed preferences.
///
/// A command-line host has no runtime permissions or location source, so
/// permission is reported granted and no location engine is attached.
pub(crate) fn build_controller(
    config: &TelemetryConfig,
    prefs: Arc<FilePreferenceStore>,
) -> anyhow::Result<TelemetryController> {
    let transport = HttpTransmissionClient::from_config(config)?;
    let collaborators = Collaborators {
        permissions: Arc::new(StaticPermission::new(true)),
        connectivity: Arc::new(StaticConnectivity::new(true)),
        transport: Arc::new(transport),
        preferences: prefs,
        device: Arc::new(StaticDevice::host()),
        manifest: Arc::new(StaticManifest::registered()),
        location: None,
    };
    Ok(TelemetryController::new(collaborators, Handle::current()))
}
