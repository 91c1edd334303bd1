//! Beacon Telemetry: client-side event pipeline.
//!
//! Events are enriched with session and device metadata, buffered in a
//! bounded queue, and sent in batches on a timer, when the queue fills, or
//! when telemetry is switched off. Delivery is best-effort: a batch is sent
//! once and discarded whatever the outcome.

pub mod backoff;
pub mod capabilities;
pub mod controller;
pub mod enrich;
pub mod listener;
pub mod permission;
pub mod platform;
pub mod queue;
pub mod reporter;
pub mod scheduler;
pub mod session;

pub use backoff::ExponentialBackoff;
pub use capabilities::{
    Collaborators, ConnectivityGate, DeviceInfo, HostManifest, LocationEngine, PermissionCheck,
    PreferenceStore, TransmissionClient, TransmissionOutcome, TELEMETRY_SERVICE_NAME,
};
pub use controller::{
    DropReason, FlushOutcome, RecordOutcome, TelemetryController, TelemetryState,
    PREF_TELEMETRY_ENABLED, PREF_VENDOR_ID,
};
pub use listener::TelemetryListener;
pub use permission::PermissionRetryLoop;
pub use platform::{
    FilePreferenceStore, MemoryPreferenceStore, StaticConnectivity, StaticDevice, StaticManifest,
    StaticPermission,
};
pub use queue::{EventQueue, QueueFull};
pub use reporter::HttpTransmissionClient;
pub use scheduler::{FlushScheduler, ScheduledTask};
pub use session::SessionIdentity;
