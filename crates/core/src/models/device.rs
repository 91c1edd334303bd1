use serde::{Deserialize, Serialize};

/// Battery level reported when the platform cannot provide one.
pub const UNAVAILABLE_BATTERY_LEVEL: u8 = 100;

/// Point-in-time device metadata, read synchronously while enriching an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Operating system name and version, e.g. "Android - 8.1.0".
    pub operating_system: String,
    pub model: String,
    /// Battery charge in percent, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(default)]
    pub plugged_in: bool,
    /// "Portrait" or "Landscape", when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(default)]
    pub display_density: f64,
    #[serde(default)]
    pub font_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Cellular network type name (e.g. "LTE"), when on a cellular network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(default)]
    pub wifi: bool,
    /// "Foreground", "Background" or "Unknown".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_state: Option<String>,
    /// Media volume in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_level: Option<u8>,
    /// Screen brightness in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_brightness: Option<u8>,
}

impl DeviceSnapshot {
    pub fn battery_level_or_default(&self) -> u8 {
        self.battery_level.unwrap_or(UNAVAILABLE_BATTERY_LEVEL)
    }
}
