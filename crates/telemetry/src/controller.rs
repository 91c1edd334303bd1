//! The telemetry controller: lifecycle, ingestion, and flush orchestration.
//!
//! All mutable pipeline state (queue, session, lifecycle, timers) sits behind
//! one mutex. The lock is held only for in-memory bookkeeping; network sends
//! run on spawned tasks and report back through [`TelemetryController::complete_flush`].
//! Listener callbacks and location engine calls happen after the lock is released.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beacon_core::config::TelemetryConfig;
use beacon_core::error::{BeaconError, Result};
use beacon_core::models::{Attributes, Event, EventKind, LocationFix};
use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::ExponentialBackoff;
use crate::capabilities::{Collaborators, TransmissionOutcome, TELEMETRY_SERVICE_NAME};
use crate::enrich::{self, EnrichmentContext};
use crate::listener::{ListenerSet, TelemetryListener};
use crate::permission::PermissionRetryLoop;
use crate::queue::EventQueue;
use crate::scheduler::{FlushScheduler, ScheduledTask};
use crate::session::SessionIdentity;

/// Preference key holding the anonymous vendor identifier.
pub const PREF_VENDOR_ID: &str = "vendorId";

/// Preference key holding the opt-in flag.
pub const PREF_TELEMETRY_ENABLED: &str = "telemetryEnabled";

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    Uninitialized,
    Enabled,
    Disabled,
    /// Disable requested; waiting for the last flush to complete.
    ShuttingDown,
}

impl TelemetryState {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::ShuttingDown => "shutting-down",
        }
    }
}

impl fmt::Display for TelemetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recorded event was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A float attribute was NaN or infinite.
    InvalidEvent,
    /// The queue was at capacity while a flush was in flight.
    QueueFull,
    /// The `event` attribute was missing or not a known type.
    UnknownKind,
}

/// What happened to a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Queued,
    /// Queued, and the append triggered a flush.
    QueuedAndFlushed,
    Dropped(DropReason),
    /// Telemetry is not enabled.
    Ignored,
}

/// What a flush request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A batch of this many events was handed to the transport.
    Dispatched(usize),
    /// A previous flush has not completed yet.
    InFlight,
    Empty,
    /// The network was unreachable; queued events were discarded.
    Offline,
    /// Telemetry is not enabled; queued events were discarded.
    Skipped,
}

/// Work decided under the lock and carried out after it is released.
#[derive(Default)]
struct Effects {
    dispatch: Option<Vec<Event>>,
    activate_location: bool,
    deactivate_location: bool,
}

impl Effects {
    fn merge(&mut self, other: Effects) {
        if self.dispatch.is_none() {
            self.dispatch = other.dispatch;
        }
        self.activate_location |= other.activate_location;
        self.deactivate_location |= other.deactivate_location;
    }
}

struct ControllerState {
    lifecycle: TelemetryState,
    config: Option<TelemetryConfig>,
    queue: EventQueue,
    session: Option<SessionIdentity>,
    vendor_id: String,
    flush_in_flight: bool,
    shutdown_pending: bool,
    flush_task: Option<ScheduledTask>,
    permission_task: Option<ScheduledTask>,
    location_active: bool,
    custom_turnstile: Option<Attributes>,
    rotation_hours: Option<u32>,
}

struct Inner {
    collaborators: Collaborators,
    runtime: Handle,
    state: Mutex<ControllerState>,
    listeners: ListenerSet,
    idle: Notify,
}

/// Handle to one telemetry pipeline. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct TelemetryController {
    inner: Arc<Inner>,
}

impl TelemetryController {
    /// Create an uninitialized controller. Timers and sends are spawned on `runtime`.
    pub fn new(collaborators: Collaborators, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                collaborators,
                runtime,
                state: Mutex::new(ControllerState {
                    lifecycle: TelemetryState::Uninitialized,
                    config: None,
                    queue: EventQueue::new(1),
                    session: None,
                    vendor_id: String::new(),
                    flush_in_flight: false,
                    shutdown_pending: false,
                    flush_task: None,
                    permission_task: None,
                    location_active: false,
                    custom_turnstile: None,
                    rotation_hours: None,
                }),
                listeners: ListenerSet::default(),
                idle: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the pipeline. A second call is a no-op.
    ///
    /// Fails with [`BeaconError::Config`] when the configuration is invalid or
    /// the host has not registered the telemetry service.
    pub fn initialize(&self, config: TelemetryConfig) -> Result<()> {
        if self.state() != TelemetryState::Uninitialized {
            debug!("telemetry already initialized");
            return Ok(());
        }

        config.validate()?;
        if !self
            .inner
            .collaborators
            .manifest
            .has_service(TELEMETRY_SERVICE_NAME)
        {
            return Err(BeaconError::Config(format!(
                "host has not registered the {TELEMETRY_SERVICE_NAME} background service"
            )));
        }

        let prefs = &self.inner.collaborators.preferences;
        let vendor_id = match prefs.get(PREF_VENDOR_ID).filter(|v| !v.is_empty()) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                if let Err(err) = prefs.set(PREF_VENDOR_ID, &id) {
                    warn!(error = %err, "failed to persist vendor id");
                }
                id
            }
        };
        let enabled = prefs.get_bool(PREF_TELEMETRY_ENABLED).unwrap_or(true);

        let mut effects = Effects::default();
        {
            let mut st = self.lock();
            if st.lifecycle != TelemetryState::Uninitialized {
                return Ok(());
            }

            let hours = st.rotation_hours.unwrap_or(config.session.rotation_hours);
            st.session = Some(SessionIdentity::new(SessionIdentity::window_from_hours(hours)));
            st.queue = EventQueue::new(config.queue.capacity);
            st.vendor_id = vendor_id;
            st.config = Some(config);

            if enabled {
                st.lifecycle = TelemetryState::Enabled;
                self.start_collection(&mut st, &mut effects);
            } else {
                st.lifecycle = TelemetryState::Disabled;
                self.queue_turnstile(&mut st);
                let (_, flushed) = self.flush_locked(&mut st, true);
                effects.merge(flushed);
            }
            info!(state = %st.lifecycle, capacity = st.queue.capacity(), "telemetry initialized");
        }
        self.apply(effects);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TelemetryState {
        self.lock().lifecycle
    }

    /// True only in the `Enabled` state; `ShuttingDown` counts as off.
    pub fn is_enabled(&self) -> bool {
        self.state() == TelemetryState::Enabled
    }

    /// Opt in or out. The choice is persisted even before initialization.
    ///
    /// Disabling stops the flush timer and permission polling immediately,
    /// queues a turnstile and flushes; the controller becomes `Disabled` when
    /// that flush completes.
    pub fn set_enabled(&self, enabled: bool) {
        if let Err(err) = self
            .inner
            .collaborators
            .preferences
            .set_bool(PREF_TELEMETRY_ENABLED, enabled)
        {
            warn!(error = %err, "failed to persist telemetry preference");
        }

        let mut effects = Effects::default();
        {
            let mut st = self.lock();
            match (st.lifecycle, enabled) {
                (TelemetryState::Uninitialized, _)
                | (TelemetryState::Enabled, true)
                | (TelemetryState::Disabled, false)
                | (TelemetryState::ShuttingDown, false) => return,
                (TelemetryState::Disabled, true) | (TelemetryState::ShuttingDown, true) => {
                    st.lifecycle = TelemetryState::Enabled;
                    st.shutdown_pending = false;
                    self.start_collection(&mut st, &mut effects);
                    info!("telemetry enabled");
                }
                (TelemetryState::Enabled, false) => {
                    st.lifecycle = TelemetryState::ShuttingDown;
                    st.shutdown_pending = true;
                    cancel(&mut st.flush_task);
                    cancel(&mut st.permission_task);
                    info!(queued = st.queue.len(), "telemetry shutting down");
                    self.queue_turnstile(&mut st);
                    let (_, flushed) = self.flush_locked(&mut st, true);
                    effects.merge(flushed);
                }
            }
        }
        self.apply(effects);
    }

    /// Record an event of `kind`. Never fails; see [`RecordOutcome`].
    pub fn record_event(&self, kind: EventKind, attributes: Attributes) -> RecordOutcome {
        self.record(Event::new(kind, attributes))
    }

    /// Record a raw attribute map whose `event` attribute names the type.
    pub fn record_attributes(&self, attributes: Attributes) -> RecordOutcome {
        match Event::try_from(attributes) {
            Ok(event) => self.record(event),
            Err(err) => {
                warn!(error = %err, "dropping event with unknown type");
                RecordOutcome::Dropped(DropReason::UnknownKind)
            }
        }
    }

    /// Record a `location` event for a position fix.
    pub fn record_location(&self, fix: LocationFix) -> RecordOutcome {
        self.record(Event::new(
            EventKind::Location,
            enrich::location_fix_attributes(&fix),
        ))
    }

    /// Enrich and queue `event`. A `map.load` also queues a turnstile and
    /// flushes; reaching capacity flushes within the same call.
    pub fn record(&self, event: Event) -> RecordOutcome {
        if !event.is_finite() {
            debug!(kind = %event.kind(), "dropping event with non-finite value");
            return RecordOutcome::Dropped(DropReason::InvalidEvent);
        }
        let device = self.inner.collaborators.device.read();
        let kind = event.kind();

        let mut effects = Effects::default();
        let outcome = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if st.lifecycle != TelemetryState::Enabled {
                debug!(kind = %kind, state = %st.lifecycle, "telemetry not enabled, ignoring event");
                return RecordOutcome::Ignored;
            }

            let enriched = {
                let Some(session) = st.session.as_mut() else {
                    return RecordOutcome::Ignored;
                };
                if session.rotate_if_due() {
                    debug!("session identifier rotated");
                }
                let session = &*session;
                let hashed = session.hashed();
                let source = st.config.as_ref().map_or("", |c| c.source.as_str());
                let ctx = EnrichmentContext {
                    session_id: session.current(),
                    hashed_session_id: &hashed,
                    vendor_id: &st.vendor_id,
                    source,
                    device: &device,
                };
                enrich::enrich(event, &ctx)
            };

            match st.queue.append(enriched) {
                Err(full) => {
                    debug!(
                        kind = %kind,
                        capacity = full.capacity,
                        "event queue full, dropping event"
                    );
                    RecordOutcome::Dropped(DropReason::QueueFull)
                }
                Ok(now_full) => {
                    let mut flushed = false;
                    if now_full {
                        debug!(capacity = st.queue.capacity(), "event queue reached capacity");
                        let (_, e) = self.flush_locked(st, false);
                        effects.merge(e);
                        flushed = true;
                    }
                    if kind == EventKind::MapLoad {
                        self.queue_turnstile(st);
                        let (_, e) = self.flush_locked(st, true);
                        effects.merge(e);
                        flushed = true;
                    }
                    if flushed {
                        RecordOutcome::QueuedAndFlushed
                    } else {
                        RecordOutcome::Queued
                    }
                }
            }
        };
        self.apply(effects);
        outcome
    }

    /// Send everything queued now. See [`FlushOutcome`].
    pub fn flush_now(&self) -> FlushOutcome {
        let (outcome, effects) = {
            let mut st = self.lock();
            self.flush_locked(&mut st, false)
        };
        self.apply(effects);
        outcome
    }

    /// Resolves once no flush is in flight.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.lock().flush_in_flight {
                return;
            }
            notified.await;
        }
    }

    /// Register `listener`. Returns false if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn TelemetryListener>) -> bool {
        self.inner.listeners.add(listener)
    }

    /// Unregister `listener`. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn TelemetryListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    /// Replace the base record used for turnstile events; `None` restores the default.
    pub fn set_custom_turnstile(&self, template: Option<Attributes>) {
        self.lock().custom_turnstile = template;
    }

    /// Change the session rotation window (1 to 24 hours).
    pub fn set_session_rotation_hours(&self, hours: u32) -> Result<()> {
        if !(1..=24).contains(&hours) {
            return Err(BeaconError::Config(format!(
                "session rotation must be between 1 and 24 hours, got {hours}"
            )));
        }
        let mut st = self.lock();
        st.rotation_hours = Some(hours);
        if let Some(session) = st.session.as_mut() {
            session.set_window(SessionIdentity::window_from_hours(hours));
        }
        Ok(())
    }

    /// Anonymous vendor id, once initialized.
    pub fn vendor_id(&self) -> Option<String> {
        let st = self.lock();
        (!st.vendor_id.is_empty()).then(|| st.vendor_id.clone())
    }

    /// Current session token, once initialized.
    pub fn session_id(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.current().to_string())
    }

    /// Number of events waiting for the next flush.
    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// True while a dispatched batch has not completed.
    pub fn is_flush_in_flight(&self) -> bool {
        self.lock().flush_in_flight
    }

    /// Start the flush timer and bring up location, polling for permission
    /// when it is not granted yet.
    fn start_collection(&self, st: &mut ControllerState, effects: &mut Effects) {
        let Some(config) = st.config.as_ref() else {
            return;
        };
        let scheduler = FlushScheduler::new(config.flush.initial_delay(), config.flush.period());
        let backoff = ExponentialBackoff::from_config(&config.backoff);

        let weak = Arc::downgrade(&self.inner);
        st.flush_task = Some(scheduler.start(&self.inner.runtime, move || {
            if let Some(inner) = weak.upgrade() {
                TelemetryController { inner }.flush_now();
            }
        }));

        if st.location_active || st.permission_task.is_some() {
            return;
        }
        if self.inner.collaborators.permissions.is_granted() {
            st.location_active = true;
            effects.activate_location = true;
            return;
        }

        debug!("location permission not granted, polling with backoff");
        let weak = Arc::downgrade(&self.inner);
        let permissions = Arc::clone(&self.inner.collaborators.permissions);
        st.permission_task = Some(PermissionRetryLoop::new(permissions, backoff).start(
            &self.inner.runtime,
            move || {
                if let Some(inner) = weak.upgrade() {
                    TelemetryController { inner }.on_permission_granted();
                }
            },
        ));
    }

    fn on_permission_granted(&self) {
        let activate = {
            let mut st = self.lock();
            st.permission_task = None;
            if st.lifecycle != TelemetryState::Enabled || st.location_active {
                false
            } else {
                st.location_active = true;
                true
            }
        };
        if activate {
            info!("location permission granted");
            self.apply(Effects {
                activate_location: true,
                ..Default::default()
            });
        }
    }

    fn queue_turnstile(&self, st: &mut ControllerState) {
        let enabled = st.lifecycle == TelemetryState::Enabled;
        let (sdk_identifier, sdk_version) = st
            .config
            .as_ref()
            .map(|c| (c.sdk_identifier.as_str(), c.sdk_version.as_str()))
            .unwrap_or_default();
        let event = enrich::turnstile(
            st.custom_turnstile.as_ref(),
            &st.vendor_id,
            enabled,
            sdk_identifier,
            sdk_version,
            Utc::now(),
        );
        if let Err(full) = st.queue.append(event) {
            debug!(capacity = full.capacity, "event queue full, dropping turnstile");
        }
    }

    /// Decide what a flush does. `with_turnstile` lets a turnstile go out
    /// while telemetry is not enabled.
    fn flush_locked(&self, st: &mut ControllerState, with_turnstile: bool) -> (FlushOutcome, Effects) {
        let mut effects = Effects::default();

        if st.lifecycle == TelemetryState::Uninitialized {
            return (FlushOutcome::Skipped, effects);
        }
        if st.flush_in_flight {
            return (FlushOutcome::InFlight, effects);
        }
        if !with_turnstile && st.lifecycle != TelemetryState::Enabled {
            st.queue.drain_all();
            return (FlushOutcome::Skipped, effects);
        }
        if st.queue.is_empty() {
            if st.shutdown_pending {
                self.finalize_shutdown(st, &mut effects);
            }
            return (FlushOutcome::Empty, effects);
        }
        if !self.inner.collaborators.connectivity.is_reachable() {
            let dropped = st.queue.drain_all().len();
            debug!(dropped, "network unreachable, discarding queued events");
            if st.shutdown_pending {
                self.finalize_shutdown(st, &mut effects);
            }
            return (FlushOutcome::Offline, effects);
        }

        let batch = st.queue.drain_all();
        let count = batch.len();
        st.flush_in_flight = true;
        effects.dispatch = Some(batch);
        (FlushOutcome::Dispatched(count), effects)
    }

    fn finalize_shutdown(&self, st: &mut ControllerState, effects: &mut Effects) {
        st.shutdown_pending = false;
        st.lifecycle = TelemetryState::Disabled;
        cancel(&mut st.flush_task);
        cancel(&mut st.permission_task);
        st.queue.drain_all();
        if st.location_active {
            st.location_active = false;
            effects.deactivate_location = true;
        }
        info!("telemetry disabled");
    }

    fn apply(&self, effects: Effects) {
        let location = self.inner.collaborators.location.as_ref();
        if effects.activate_location {
            if let Some(location) = location {
                location.activate();
            }
        }
        if let Some(batch) = effects.dispatch {
            self.dispatch(batch);
        }
        if effects.deactivate_location {
            if let Some(location) = location {
                location.deactivate();
            }
        }
    }

    fn dispatch(&self, batch: Vec<Event>) {
        let count = batch.len();
        debug!(events = count, "dispatching telemetry batch");
        self.inner.listeners.notify(|l| l.on_batch_sent(count));

        let controller = self.clone();
        let transport = Arc::clone(&self.inner.collaborators.transport);
        self.inner.runtime.spawn(async move {
            let outcome = transport.send(batch).await;
            controller.complete_flush(count, outcome);
        });
    }

    /// Single completion path for every dispatched batch, whatever the outcome.
    fn complete_flush(&self, count: usize, outcome: TransmissionOutcome) {
        match &outcome {
            TransmissionOutcome::Response { success: true, status } => {
                debug!(events = count, status, "telemetry batch delivered");
            }
            TransmissionOutcome::Response { success: false, status } => {
                warn!(events = count, status, "telemetry batch rejected, events discarded");
            }
            TransmissionOutcome::Failure(message) => {
                warn!(events = count, error = %message, "telemetry batch lost, events discarded");
            }
        }

        let effects = {
            let mut st = self.lock();
            st.flush_in_flight = false;
            if st.shutdown_pending {
                self.flush_locked(&mut st, true).1
            } else if st.queue.is_full() {
                self.flush_locked(&mut st, false).1
            } else {
                Effects::default()
            }
        };

        match &outcome {
            TransmissionOutcome::Response { success, status } => self
                .inner
                .listeners
                .notify(|l| l.on_transmission_result(*success, *status)),
            TransmissionOutcome::Failure(message) => self
                .inner
                .listeners
                .notify(|l| l.on_transmission_failure(message)),
        }

        self.apply(effects);
        self.inner.idle.notify_waiters();
    }
}

fn cancel(task: &mut Option<ScheduledTask>) {
    if let Some(task) = task.take() {
        task.cancel();
    }
}
