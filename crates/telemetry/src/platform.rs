//! Simple capability implementations for hosts without a richer platform layer.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use beacon_core::error::{BeaconError, Result};
use beacon_core::models::DeviceSnapshot;

use crate::capabilities::{
    ConnectivityGate, DeviceInfo, HostManifest, PermissionCheck, PreferenceStore,
    TELEMETRY_SERVICE_NAME,
};

/// Permission with a switchable grant status.
#[derive(Debug, Default)]
pub struct StaticPermission(AtomicBool);

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        Self(AtomicBool::new(granted))
    }

    pub fn set_granted(&self, granted: bool) {
        self.0.store(granted, Ordering::SeqCst);
    }
}

impl PermissionCheck for StaticPermission {
    fn is_granted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connectivity with a switchable reachability flag.
#[derive(Debug, Default)]
pub struct StaticConnectivity(AtomicBool);

impl StaticConnectivity {
    pub fn new(reachable: bool) -> Self {
        Self(AtomicBool::new(reachable))
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.0.store(reachable, Ordering::SeqCst);
    }
}

impl ConnectivityGate for StaticConnectivity {
    fn is_reachable(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Device metadata fixed at construction, replaceable with [`StaticDevice::update`].
#[derive(Debug, Default)]
pub struct StaticDevice(Mutex<DeviceSnapshot>);

impl StaticDevice {
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        Self(Mutex::new(snapshot))
    }

    /// Snapshot describing the machine the process runs on.
    pub fn host() -> Self {
        Self::new(DeviceSnapshot {
            operating_system: format!("{} - {}", std::env::consts::OS, std::env::consts::ARCH),
            model: std::env::consts::ARCH.to_string(),
            application_state: Some("Foreground".into()),
            display_density: 1.0,
            font_scale: 1.0,
            ..Default::default()
        })
    }

    pub fn update(&self, snapshot: DeviceSnapshot) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

impl DeviceInfo for StaticDevice {
    fn read(&self) -> DeviceSnapshot {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Fixed list of registered service names.
#[derive(Debug, Clone, Default)]
pub struct StaticManifest {
    services: Vec<String>,
}

impl StaticManifest {
    /// A manifest that registers the telemetry service.
    pub fn registered() -> Self {
        Self {
            services: vec![TELEMETRY_SERVICE_NAME.to_string()],
        }
    }

    pub fn with_services<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            services: services.into_iter().map(Into::into).collect(),
        }
    }
}

impl HostManifest for StaticManifest {
    fn has_service(&self, name: &str) -> bool {
        self.services.iter().any(|s| s == name)
    }
}

/// In-process preference store. Values are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore(Mutex<HashMap<String, String>>);

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences persisted as a flat JSON object, rewritten on every `set`.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FilePreferenceStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                BeaconError::Preference(format!(
                    "failed to parse preferences at {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = values.clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}
