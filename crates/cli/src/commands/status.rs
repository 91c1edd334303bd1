use beacon_core::config::TelemetryConfig;
use beacon_telemetry::{
    FilePreferenceStore, HttpTransmissionClient, PreferenceStore, PREF_TELEMETRY_ENABLED,
    PREF_VENDOR_ID,
};

use super::load_config;

/// Run the `status` command: show endpoint, opt-in flag and vendor id.
pub async fn run(config_path: &str, prefs_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let prefs = FilePreferenceStore::open(prefs_path)?;
    print!("{}", render(&config.telemetry, &prefs)?);
    Ok(())
}

fn render(config: &TelemetryConfig, prefs: &dyn PreferenceStore) -> anyhow::Result<String> {
    let client = HttpTransmissionClient::from_config(config)?;
    let enabled = prefs.get_bool(PREF_TELEMETRY_ENABLED).unwrap_or(true);
    let vendor_id = prefs
        .get(PREF_VENDOR_ID)
        .unwrap_or_else(|| "(not yet assigned)".to_string());

    let mut out = String::new();
    out.push_str("Beacon Status\n");
    out.push_str("=============\n");
    out.push_str(&format!("Endpoint:   {}\n", client.events_url()));
    out.push_str(&format!("User-Agent: {}\n", client.user_agent()));
    out.push_str(&format!(
        "Telemetry:  {}\n",
        if enabled { "enabled" } else { "disabled" }
    ));
    out.push_str(&format!("Vendor id:  {vendor_id}\n"));
    out.push('\n');
    out.push_str("Pipeline\n");
    out.push_str("--------\n");
    out.push_str(&format!("Queue capacity:   {}\n", config.queue.capacity));
    out.push_str(&format!(
        "Flush schedule:   after {}s, then every {}s\n",
        config.flush.initial_delay_secs, config.flush.period_secs
    ));
    out.push_str(&format!(
        "Session rotation: {}h\n",
        config.session.rotation_hours
    ));
    Ok(out)
}
