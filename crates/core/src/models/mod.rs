//! Event data model shared by the pipeline and its hosts.

pub mod device;
pub mod event;
pub mod location;

pub use device::DeviceSnapshot;
pub use event::{AttributeValue, Attributes, Event, EventKind, Gesture};
pub use location::LocationFix;
