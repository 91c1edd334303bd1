//! Telemetry event records.
//!
//! An [`Event`] is a flat, ordered mapping from attribute names to scalar
//! values. It always carries `event` (the type discriminator) and `created`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::location::LocationFix;

pub const KEY_EVENT: &str = "event";
pub const KEY_CREATED: &str = "created";
pub const KEY_USER_ID: &str = "userId";
pub const KEY_ENABLED_TELEMETRY: &str = "enabled.telemetry";
pub const KEY_MODEL: &str = "model";
pub const KEY_OPERATING_SYSTEM: &str = "operatingSystem";
pub const KEY_RESOLUTION: &str = "resolution";
pub const KEY_ACCESSIBILITY_FONT_SCALE: &str = "accessibilityFontScale";
pub const KEY_ORIENTATION: &str = "orientation";
pub const KEY_BATTERY_LEVEL: &str = "batteryLevel";
pub const KEY_PLUGGED_IN: &str = "pluggedIn";
pub const KEY_CARRIER: &str = "carrier";
pub const KEY_CELLULAR_NETWORK_TYPE: &str = "cellularNetworkType";
pub const KEY_WIFI: &str = "wifi";
pub const KEY_GESTURE_ID: &str = "gesture";
pub const KEY_LATITUDE: &str = "lat";
pub const KEY_LONGITUDE: &str = "lng";
pub const KEY_ZOOM: &str = "zoom";
pub const KEY_SOURCE: &str = "source";
pub const KEY_SESSION_ID: &str = "sessionId";
pub const KEY_ALTITUDE: &str = "altitude";
pub const KEY_APPLICATION_STATE: &str = "applicationState";
pub const KEY_HORIZONTAL_ACCURACY: &str = "horizontalAccuracy";
pub const KEY_SDK_IDENTIFIER: &str = "sdkIdentifier";
pub const KEY_SDK_VERSION: &str = "sdkVersion";

// Navigation metadata
pub const KEY_DEVICE: &str = "device";
pub const KEY_VOLUME_LEVEL: &str = "volumeLevel";
pub const KEY_SCREEN_BRIGHTNESS: &str = "screenBrightness";
pub const KEY_BATTERY_PLUGGED_IN: &str = "batteryPluggedIn";
pub const KEY_CONNECTIVITY: &str = "connectivity";

/// Format a timestamp the way the collection endpoint expects it,
/// e.g. `2017-07-18T14:05:09.123+0000`.
pub fn format_created(at: &DateTime<Utc>) -> String {
    at.format(CREATED_FORMAT).to_string()
}

const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// True when `value` is a timestamp text in the endpoint format or RFC 3339.
pub fn is_valid_created(value: &AttributeValue) -> bool {
    value.as_str().is_some_and(|s| {
        DateTime::parse_from_str(s, CREATED_FORMAT).is_ok()
            || DateTime::parse_from_rfc3339(s).is_ok()
    })
}

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// False only for a float that is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u8> for AttributeValue {
    fn from(v: u8) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Ordered attribute map backing an [`Event`].
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Event type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Turnstile,
    MapLoad,
    MapClick,
    MapDragEnd,
    Location,
    NavigationDepart,
    NavigationFeedback,
    NavigationArrive,
    NavigationCancel,
    NavigationReroute,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        Self::Turnstile,
        Self::MapLoad,
        Self::MapClick,
        Self::MapDragEnd,
        Self::Location,
        Self::NavigationDepart,
        Self::NavigationFeedback,
        Self::NavigationArrive,
        Self::NavigationCancel,
        Self::NavigationReroute,
    ];

    /// Wire name carried in the `event` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Turnstile => "appUserTurnstile",
            Self::MapLoad => "map.load",
            Self::MapClick => "map.click",
            Self::MapDragEnd => "map.dragend",
            Self::Location => "location",
            Self::NavigationDepart => "navigation.depart",
            Self::NavigationFeedback => "navigation.feedback",
            Self::NavigationArrive => "navigation.arrive",
            Self::NavigationCancel => "navigation.cancel",
            Self::NavigationReroute => "navigation.reroute",
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Self::NavigationDepart
                | Self::NavigationFeedback
                | Self::NavigationArrive
                | Self::NavigationCancel
                | Self::NavigationReroute
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Case-insensitive match on the wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Gesture names recorded on `map.click` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    SingleTap,
    DoubleTap,
    TwoFingerTap,
    Pan,
    Pinch,
    Rotation,
    Pitch,
    QuickZoom,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleTap => "SingleTap",
            Self::DoubleTap => "DoubleTap",
            Self::TwoFingerTap => "TwoFingerTap",
            Self::Pan => "Pan",
            Self::Pinch => "Pinch",
            Self::Rotation => "Rotation",
            Self::Pitch => "Pitch",
            Self::QuickZoom => "QuickZoom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventParseError {
    #[error("event record has no `event` attribute")]
    MissingKind,
    #[error(transparent)]
    UnknownKind(#[from] UnknownEventKind),
}

/// An immutable telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Attributes", into = "Attributes")]
pub struct Event {
    kind: EventKind,
    attributes: Attributes,
}

impl Event {
    /// Build an event stamped with the current time unless `created` is supplied.
    pub fn new(kind: EventKind, attributes: Attributes) -> Self {
        Self::at(kind, attributes, Utc::now())
    }

    /// Build an event with an explicit creation time, used when `attributes`
    /// carries no valid `created` timestamp of its own.
    pub fn at(kind: EventKind, mut attributes: Attributes, created: DateTime<Utc>) -> Self {
        attributes.insert(KEY_EVENT.into(), kind.as_str().into());
        if !attributes.get(KEY_CREATED).is_some_and(is_valid_created) {
            attributes.insert(KEY_CREATED.into(), format_created(&created).into());
        }
        Self { kind, attributes }
    }

    /// A new event with `extra` merged over the current attributes.
    /// The `event` discriminator is never overwritten.
    pub fn extended(self, extra: Attributes) -> Self {
        let Self {
            kind,
            mut attributes,
        } = self;
        for (key, value) in extra {
            if key != KEY_EVENT {
                attributes.insert(key, value);
            }
        }
        Self { kind, attributes }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn created(&self) -> Option<&str> {
        self.get(KEY_CREATED).and_then(AttributeValue::as_str)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// True when every float attribute is finite.
    pub fn is_finite(&self) -> bool {
        self.attributes.values().all(AttributeValue::is_finite)
    }

    /// `map.load` event.
    pub fn map_load() -> Self {
        Self::new(EventKind::MapLoad, Attributes::new())
    }

    /// `map.click` event at the start of a gesture; `None` for non-finite coordinates.
    pub fn map_click(location: &LocationFix, gesture: Gesture, zoom: f64) -> Option<Self> {
        if !location.has_finite_coordinates() {
            return None;
        }
        let mut attributes = map_position(location, zoom);
        attributes.insert(KEY_GESTURE_ID.into(), gesture.as_str().into());
        Some(Self::at(
            EventKind::MapClick,
            attributes,
            location.timestamp.unwrap_or_else(Utc::now),
        ))
    }

    /// `map.dragend` event; `None` for non-finite coordinates.
    pub fn map_drag_end(location: &LocationFix, zoom: f64) -> Option<Self> {
        if !location.has_finite_coordinates() {
            return None;
        }
        Some(Self::at(
            EventKind::MapDragEnd,
            map_position(location, zoom),
            location.timestamp.unwrap_or_else(Utc::now),
        ))
    }
}

fn map_position(location: &LocationFix, zoom: f64) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(KEY_LATITUDE.into(), location.latitude.into());
    attributes.insert(KEY_LONGITUDE.into(), location.longitude.into());
    attributes.insert(KEY_ZOOM.into(), zoom.into());
    attributes
}

impl From<Event> for Attributes {
    fn from(event: Event) -> Self {
        event.attributes
    }
}

impl TryFrom<Attributes> for Event {
    type Error = EventParseError;

    fn try_from(attributes: Attributes) -> Result<Self, Self::Error> {
        let kind: EventKind = attributes
            .get(KEY_EVENT)
            .and_then(AttributeValue::as_str)
            .ok_or(EventParseError::MissingKind)?
            .parse()?;
        Ok(Self::new(kind, attributes))
    }
}
