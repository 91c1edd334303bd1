//! Platform capabilities the pipeline consumes but does not implement.

use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::error::Result;
use beacon_core::models::{DeviceSnapshot, Event};

/// Name the host must register its background telemetry service under.
pub const TELEMETRY_SERVICE_NAME: &str = "TelemetryService";

/// Current grant status of a runtime permission (e.g. location access).
pub trait PermissionCheck: Send + Sync {
    fn is_granted(&self) -> bool;
}

/// Current network reachability.
pub trait ConnectivityGate: Send + Sync {
    fn is_reachable(&self) -> bool;
}

/// Result of one batch send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionOutcome {
    /// The server answered. `success` is true for a 2xx status.
    Response { success: bool, status: u16 },
    /// No response: timeout, DNS, connection refused, encoding failure.
    Failure(String),
}

impl TransmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Response { success: true, .. })
    }
}

/// Performs the network send of one batch. Implementations bound their own
/// call duration; the returned future resolving is the only completion signal.
#[async_trait]
pub trait TransmissionClient: Send + Sync {
    async fn send(&self, batch: Vec<Event>) -> TransmissionOutcome;
}

/// Durable key/value persistence across process restarts.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}

/// Point-in-time device metadata.
pub trait DeviceInfo: Send + Sync {
    fn read(&self) -> DeviceSnapshot;
}

/// What the host application has registered with its platform.
pub trait HostManifest: Send + Sync {
    fn has_service(&self, name: &str) -> bool;
}

/// Source of location fixes, switched on once location permission is granted.
pub trait LocationEngine: Send + Sync {
    fn activate(&self);
    fn deactivate(&self);
}

/// Everything a controller needs from its host, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionCheck>,
    pub connectivity: Arc<dyn ConnectivityGate>,
    pub transport: Arc<dyn TransmissionClient>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub device: Arc<dyn DeviceInfo>,
    pub manifest: Arc<dyn HostManifest>,
    pub location: Option<Arc<dyn LocationEngine>>,
}
