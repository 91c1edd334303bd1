//! Per-kind contextual attributes added to events before they are queued.

use beacon_core::models::event::{
    format_created, KEY_ACCESSIBILITY_FONT_SCALE, KEY_ALTITUDE, KEY_APPLICATION_STATE,
    KEY_BATTERY_LEVEL, KEY_BATTERY_PLUGGED_IN, KEY_CARRIER, KEY_CELLULAR_NETWORK_TYPE,
    KEY_CONNECTIVITY, KEY_CREATED, KEY_DEVICE, KEY_ENABLED_TELEMETRY, KEY_HORIZONTAL_ACCURACY,
    KEY_LATITUDE, KEY_LONGITUDE, KEY_MODEL, KEY_OPERATING_SYSTEM, KEY_ORIENTATION,
    KEY_PLUGGED_IN, KEY_RESOLUTION, KEY_SCREEN_BRIGHTNESS, KEY_SDK_IDENTIFIER, KEY_SDK_VERSION,
    KEY_SESSION_ID, KEY_SOURCE, KEY_USER_ID, KEY_VOLUME_LEVEL, KEY_WIFI,
};
use beacon_core::models::location::truncate_coordinate;
use beacon_core::models::{AttributeValue, Attributes, DeviceSnapshot, Event, EventKind, LocationFix};
use chrono::{DateTime, Utc};

/// Values the enrichment step reads; borrowed from the controller for one event.
pub struct EnrichmentContext<'a> {
    /// Active session token, in clear.
    pub session_id: &'a str,
    /// SHA-256 of the session token, for records that also carry the vendor id.
    pub hashed_session_id: &'a str,
    pub vendor_id: &'a str,
    pub source: &'a str,
    pub device: &'a DeviceSnapshot,
}

/// Add the attributes appropriate to the event's kind. Enrichment values
/// replace producer-supplied values under the same key.
pub fn enrich(event: Event, ctx: &EnrichmentContext<'_>) -> Event {
    let extra = match event.kind() {
        EventKind::Location => location_attributes(&event, ctx),
        EventKind::MapLoad => map_load_attributes(ctx),
        EventKind::MapClick | EventKind::MapDragEnd => {
            let mut attrs = Attributes::new();
            attrs.insert(KEY_SESSION_ID.into(), ctx.session_id.into());
            insert_interaction_device(&mut attrs, ctx.device);
            attrs
        }
        kind if kind.is_navigation() => navigation_attributes(ctx.device),
        _ => Attributes::new(),
    };
    event.extended(extra)
}

/// Attributes for a `location` event built from a raw fix.
pub fn location_fix_attributes(fix: &LocationFix) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(KEY_LATITUDE.into(), fix.latitude.into());
    attrs.insert(KEY_LONGITUDE.into(), fix.longitude.into());
    attrs.insert(KEY_ALTITUDE.into(), fix.altitude.into());
    attrs.insert(KEY_HORIZONTAL_ACCURACY.into(), fix.accuracy.into());
    if let Some(at) = fix.timestamp {
        attrs.insert(KEY_CREATED.into(), format_created(&at).into());
    }
    attrs
}

/// Billing turnstile. A host-supplied `template` provides the base record;
/// the identity fields below always overwrite it.
pub fn turnstile(
    template: Option<&Attributes>,
    vendor_id: &str,
    telemetry_enabled: bool,
    sdk_identifier: &str,
    sdk_version: &str,
    now: DateTime<Utc>,
) -> Event {
    let mut attrs = template.cloned().unwrap_or_default();
    attrs.insert(KEY_CREATED.into(), format_created(&now).into());
    attrs.insert(KEY_USER_ID.into(), vendor_id.into());
    attrs.insert(KEY_ENABLED_TELEMETRY.into(), telemetry_enabled.into());
    attrs.insert(KEY_SDK_IDENTIFIER.into(), non_empty(sdk_identifier));
    attrs.insert(KEY_SDK_VERSION.into(), non_empty(sdk_version));
    Event::at(EventKind::Turnstile, attrs, now)
}

fn non_empty(value: &str) -> AttributeValue {
    if value.is_empty() {
        AttributeValue::Null
    } else {
        value.into()
    }
}

fn location_attributes(event: &Event, ctx: &EnrichmentContext<'_>) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(KEY_SOURCE.into(), ctx.source.into());
    attrs.insert(KEY_SESSION_ID.into(), ctx.session_id.into());
    for key in [KEY_LATITUDE, KEY_LONGITUDE] {
        if let Some(value) = event.get(key).and_then(AttributeValue::as_f64) {
            attrs.insert(key.into(), truncate_coordinate(value).into());
        }
    }
    for key in [KEY_ALTITUDE, KEY_HORIZONTAL_ACCURACY] {
        if let Some(value) = event.get(key).and_then(AttributeValue::as_f64) {
            attrs.insert(key.into(), (value.round() as i64).into());
        }
    }
    attrs.insert(
        KEY_OPERATING_SYSTEM.into(),
        ctx.device.operating_system.as_str().into(),
    );
    if let Some(state) = &ctx.device.application_state {
        attrs.insert(KEY_APPLICATION_STATE.into(), state.as_str().into());
    }
    attrs
}

fn map_load_attributes(ctx: &EnrichmentContext<'_>) -> Attributes {
    let device = ctx.device;
    let mut attrs = Attributes::new();
    attrs.insert(KEY_USER_ID.into(), ctx.vendor_id.into());
    attrs.insert(KEY_SESSION_ID.into(), ctx.hashed_session_id.into());
    attrs.insert(KEY_MODEL.into(), device.model.as_str().into());
    attrs.insert(
        KEY_OPERATING_SYSTEM.into(),
        device.operating_system.as_str().into(),
    );
    attrs.insert(KEY_RESOLUTION.into(), device.display_density.into());
    attrs.insert(KEY_ACCESSIBILITY_FONT_SCALE.into(), device.font_scale.into());
    insert_interaction_device(&mut attrs, device);
    attrs
}

fn insert_interaction_device(attrs: &mut Attributes, device: &DeviceSnapshot) {
    if let Some(orientation) = &device.orientation {
        attrs.insert(KEY_ORIENTATION.into(), orientation.as_str().into());
    }
    attrs.insert(
        KEY_BATTERY_LEVEL.into(),
        device.battery_level_or_default().into(),
    );
    attrs.insert(KEY_PLUGGED_IN.into(), device.plugged_in.into());
    if let Some(carrier) = &device.carrier {
        attrs.insert(KEY_CARRIER.into(), carrier.as_str().into());
    }
    attrs.insert(
        KEY_CELLULAR_NETWORK_TYPE.into(),
        device.network_type.clone().into(),
    );
    attrs.insert(KEY_WIFI.into(), device.wifi.into());
}

fn navigation_attributes(device: &DeviceSnapshot) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(KEY_DEVICE.into(), device.model.as_str().into());
    if let Some(volume) = device.volume_level {
        attrs.insert(KEY_VOLUME_LEVEL.into(), volume.into());
    }
    if let Some(brightness) = device.screen_brightness {
        attrs.insert(KEY_SCREEN_BRIGHTNESS.into(), brightness.into());
    }
    if let Some(state) = &device.application_state {
        attrs.insert(KEY_APPLICATION_STATE.into(), state.as_str().into());
    }
    attrs.insert(KEY_BATTERY_PLUGGED_IN.into(), device.plugged_in.into());
    attrs.insert(
        KEY_BATTERY_LEVEL.into(),
        device.battery_level_or_default().into(),
    );
    if let Some(network) = &device.network_type {
        attrs.insert(KEY_CONNECTIVITY.into(), network.as_str().into());
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::models::event::KEY_EVENT;
    use chrono::TimeZone;

    fn device() -> DeviceSnapshot {
        DeviceSnapshot {
            operating_system: "Android - 8.1.0".into(),
            model: "Pixel 2".into(),
            battery_level: Some(64),
            plugged_in: true,
            orientation: Some("Portrait".into()),
            display_density: 2.625,
            font_scale: 1.15,
            carrier: Some("T-Mobile".into()),
            network_type: None,
            wifi: true,
            application_state: Some("Foreground".into()),
            volume_level: Some(40),
            screen_brightness: None,
        }
    }

    fn with_context<R>(device: &DeviceSnapshot, f: impl FnOnce(&EnrichmentContext<'_>) -> R) -> R {
        let ctx = EnrichmentContext {
            session_id: "session-1",
            hashed_session_id: "hashed-1",
            vendor_id: "vendor-1",
            source: "mapbox",
            device,
        };
        f(&ctx)
    }

    fn text<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
        event.get(key).and_then(AttributeValue::as_str)
    }

    #[test]
    fn location_is_truncated_and_rounded() {
        let mut fix = LocationFix::new(38.123456789, -77.987654321);
        fix.altitude = 12.6;
        fix.accuracy = 4.4;
        let raw = Event::new(EventKind::Location, location_fix_attributes(&fix));
        let event = with_context(&device(), |ctx| enrich(raw, ctx));

        assert_eq!(event.get(KEY_LATITUDE), Some(&AttributeValue::Float(38.1234567)));
        assert_eq!(event.get(KEY_LONGITUDE), Some(&AttributeValue::Float(-77.9876543)));
        assert_eq!(event.get(KEY_ALTITUDE), Some(&AttributeValue::Int(13)));
        assert_eq!(event.get(KEY_HORIZONTAL_ACCURACY), Some(&AttributeValue::Int(4)));
        assert_eq!(text(&event, KEY_SOURCE), Some("mapbox"));
        assert_eq!(text(&event, KEY_SESSION_ID), Some("session-1"));
        assert_eq!(text(&event, KEY_OPERATING_SYSTEM), Some("Android - 8.1.0"));
        assert_eq!(text(&event, KEY_APPLICATION_STATE), Some("Foreground"));
        assert!(event.get(KEY_USER_ID).is_none());
    }

    #[test]
    fn location_fix_timestamp_becomes_created() {
        let mut fix = LocationFix::new(1.0, 2.0);
        fix.timestamp = Some(Utc.with_ymd_and_hms(2017, 7, 18, 14, 5, 9).unwrap());
        let event = Event::new(EventKind::Location, location_fix_attributes(&fix));
        assert_eq!(event.created(), Some("2017-07-18T14:05:09.000+0000"));
    }

    #[test]
    fn map_load_uses_hashed_session_and_vendor_id() {
        let event = with_context(&device(), |ctx| enrich(Event::map_load(), ctx));

        assert_eq!(text(&event, KEY_USER_ID), Some("vendor-1"));
        assert_eq!(text(&event, KEY_SESSION_ID), Some("hashed-1"));
        assert_eq!(text(&event, KEY_MODEL), Some("Pixel 2"));
        assert_eq!(event.get(KEY_RESOLUTION), Some(&AttributeValue::Float(2.625)));
        assert_eq!(
            event.get(KEY_ACCESSIBILITY_FONT_SCALE),
            Some(&AttributeValue::Float(1.15))
        );
        assert_eq!(event.get(KEY_BATTERY_LEVEL), Some(&AttributeValue::Int(64)));
        assert_eq!(event.get(KEY_CELLULAR_NETWORK_TYPE), Some(&AttributeValue::Null));
        assert_eq!(text(&event, KEY_CARRIER), Some("T-Mobile"));
        assert_eq!(event.get(KEY_WIFI), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn interaction_omits_unknown_device_values() {
        let bare = DeviceSnapshot::default();
        let fix = LocationFix::new(1.0, 2.0);
        let click = Event::map_click(&fix, beacon_core::models::Gesture::Pan, 3.0).unwrap();
        let event = with_context(&bare, |ctx| enrich(click, ctx));

        assert_eq!(text(&event, KEY_SESSION_ID), Some("session-1"));
        assert!(event.get(KEY_ORIENTATION).is_none());
        assert!(event.get(KEY_CARRIER).is_none());
        assert_eq!(event.get(KEY_BATTERY_LEVEL), Some(&AttributeValue::Int(100)));
        assert_eq!(event.get(KEY_CELLULAR_NETWORK_TYPE), Some(&AttributeValue::Null));
        assert!(event.get(KEY_USER_ID).is_none());
    }

    #[test]
    fn navigation_metadata() {
        let raw = Event::new(EventKind::NavigationDepart, Attributes::new());
        let event = with_context(&device(), |ctx| enrich(raw, ctx));

        assert_eq!(text(&event, KEY_DEVICE), Some("Pixel 2"));
        assert_eq!(event.get(KEY_VOLUME_LEVEL), Some(&AttributeValue::Int(40)));
        assert!(event.get(KEY_SCREEN_BRIGHTNESS).is_none());
        assert_eq!(event.get(KEY_BATTERY_PLUGGED_IN), Some(&AttributeValue::Bool(true)));
        assert!(event.get(KEY_CONNECTIVITY).is_none());
        assert!(event.get(KEY_SESSION_ID).is_none());
    }

    #[test]
    fn turnstile_defaults_and_template() {
        let now = Utc.with_ymd_and_hms(2018, 1, 2, 3, 4, 5).unwrap();
        let event = turnstile(None, "vendor-1", false, "", "1.2.0", now);
        assert_eq!(event.kind(), EventKind::Turnstile);
        assert_eq!(text(&event, KEY_EVENT), Some("appUserTurnstile"));
        assert_eq!(event.created(), Some("2018-01-02T03:04:05.000+0000"));
        assert_eq!(event.get(KEY_ENABLED_TELEMETRY), Some(&AttributeValue::Bool(false)));
        assert_eq!(event.get(KEY_SDK_IDENTIFIER), Some(&AttributeValue::Null));
        assert_eq!(text(&event, KEY_SDK_VERSION), Some("1.2.0"));

        let mut template = Attributes::new();
        template.insert("appVersion".into(), "4.0".into());
        template.insert(KEY_USER_ID.into(), "spoofed".into());
        template.insert(KEY_CREATED.into(), "1970-01-01T00:00:00.000+0000".into());
        let event = turnstile(Some(&template), "vendor-1", true, "maps", "1.2.0", now);
        assert_eq!(text(&event, "appVersion"), Some("4.0"));
        assert_eq!(text(&event, KEY_USER_ID), Some("vendor-1"));
        assert_eq!(event.created(), Some("2018-01-02T03:04:05.000+0000"));
        assert_eq!(text(&event, KEY_SDK_IDENTIFIER), Some("maps"));
    }
}
