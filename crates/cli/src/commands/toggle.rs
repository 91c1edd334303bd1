use beacon_telemetry::{FilePreferenceStore, PreferenceStore, PREF_TELEMETRY_ENABLED};
use tracing::info;

use super::load_config;

/// Run the `enable` / `disable` commands: persist the opt-in choice.
///
/// No pipeline is started; the choice takes effect the next time one is
/// initialized. A failed write is reported to the caller.
pub async fn run(config_path: &str, prefs_path: &str, enabled: bool) -> anyhow::Result<()> {
    load_config(config_path)?;
    let prefs = FilePreferenceStore::open(prefs_path)?;
    prefs.set_bool(PREF_TELEMETRY_ENABLED, enabled)?;
    info!(enabled, prefs = prefs_path, "telemetry preference updated");

    println!(
        "Telemetry {}.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
