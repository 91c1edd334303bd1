use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use beacon_core::models::Attributes;
use beacon_telemetry::{
    DropReason, FilePreferenceStore, RecordOutcome, TelemetryController, TelemetryListener,
};
use tracing::{info, warn};

use super::{build_controller, load_config};

/// Collects transmission notifications for the summary.
#[derive(Default)]
struct SummaryListener {
    batches: AtomicUsize,
    events: AtomicUsize,
    statuses: Mutex<Vec<(bool, u16)>>,
    failures: Mutex<Vec<String>>,
}

impl TelemetryListener for SummaryListener {
    fn on_batch_sent(&self, count: usize) {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.events.fetch_add(count, Ordering::SeqCst);
    }

    fn on_transmission_result(&self, success: bool, status: u16) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push((success, status));
        }
    }

    fn on_transmission_failure(&self, message: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(message.to_string());
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub lines: usize,
    pub invalid_lines: usize,
    pub queued: usize,
    pub dropped: usize,
    pub ignored: usize,
    pub batches: usize,
    pub events_sent: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failures: usize,
}

/// Run the `replay` command: push recorded events through a live pipeline.
pub async fn run(config_path: &str, prefs_path: &str, file: &str) -> anyhow::Result<()> {
    let summary = replay(config_path, prefs_path, file).await?;

    println!("Replay Summary");
    println!("==============");
    println!("Lines read:     {}", summary.lines);
    println!("Invalid lines:  {}", summary.invalid_lines);
    println!("Queued:         {}", summary.queued);
    println!("Dropped:        {}", summary.dropped);
    println!("Ignored:        {}", summary.ignored);
    println!();
    println!("Transmission");
    println!("------------");
    println!("Batches sent:   {}", summary.batches);
    println!("Events sent:    {}", summary.events_sent);
    println!("Accepted:       {}", summary.accepted);
    println!("Rejected:       {}", summary.rejected);
    println!("Failed:         {}", summary.failures);

    Ok(())
}

async fn replay(config_path: &str, prefs_path: &str, file: &str) -> anyhow::Result<ReplaySummary> {
    let config = load_config(config_path)?;
    let prefs = Arc::new(FilePreferenceStore::open(prefs_path)?);
    let controller = build_controller(&config.telemetry, prefs)?;

    let listener = Arc::new(SummaryListener::default());
    controller.add_listener(listener.clone());
    controller.initialize(config.telemetry)?;

    let content = std::fs::read_to_string(file)?;
    let mut summary = ReplaySummary::default();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        let attributes: Attributes = match serde_json::from_str(line) {
            Ok(attributes) => attributes,
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping malformed event line");
                summary.invalid_lines += 1;
                continue;
            }
        };

        match record_with_backpressure(&controller, attributes).await {
            RecordOutcome::Queued | RecordOutcome::QueuedAndFlushed => summary.queued += 1,
            RecordOutcome::Dropped(_) => summary.dropped += 1,
            RecordOutcome::Ignored => summary.ignored += 1,
        }
    }

    loop {
        controller.wait_for_idle().await;
        if controller.queued_len() == 0 {
            break;
        }
        controller.flush_now();
    }
    info!(state = %controller.state(), "replay finished");

    summary.batches = listener.batches.load(Ordering::SeqCst);
    summary.events_sent = listener.events.load(Ordering::SeqCst);
    if let Ok(statuses) = listener.statuses.lock() {
        summary.accepted = statuses.iter().filter(|(ok, _)| *ok).count();
        summary.rejected = statuses.len() - summary.accepted;
    }
    if let Ok(failures) = listener.failures.lock() {
        summary.failures = failures.len();
    }
    Ok(summary)
}

/// Record one event, waiting out an in-flight batch instead of shedding.
///
/// A full queue is always drained when the in-flight batch completes, so a
/// single retry after waiting is enough.
async fn record_with_backpressure(
    controller: &TelemetryController,
    attributes: Attributes,
) -> RecordOutcome {
    let outcome = match controller.record_attributes(attributes.clone()) {
        RecordOutcome::Dropped(DropReason::QueueFull) => {
            controller.wait_for_idle().await;
            controller.record_attributes(attributes)
        }
        outcome => outcome,
    };
    if outcome == RecordOutcome::QueuedAndFlushed {
        controller.wait_for_idle().await;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_telemetry::{PreferenceStore, PREF_TELEMETRY_ENABLED, PREF_VENDOR_ID};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EVENTS: &str = r#"{"event":"map.load"}
{"event":"map.click","lat":38.9,"lng":-77.03,"zoom":14.0,"gesture":"SingleTap"}

{"event":"navigation.depart","distanceRemaining":1200}
{"event":"map.click", "lat": [1, 2]}
{"event":"map.zoom"}
"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: String,
        prefs: PathBuf,
        events: String,
    }

    fn fixture(base_url: &str) -> Fixture {
        fixture_with(base_url, 100, EVENTS)
    }

    fn fixture_with(base_url: &str, capacity: usize, events_ndjson: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("beacon.toml");
        std::fs::write(
            &config,
            format!(
                r#"
[telemetry]
access_token = "pk.replay"
user_agent = "MapboxTelemetryAndroid/3.0"

[telemetry.endpoint]
base_url = "{base_url}"
request_timeout_secs = 5

[telemetry.queue]
capacity = {capacity}
"#
            ),
        )
        .unwrap();
        let events = dir.path().join("events.ndjson");
        std::fs::write(&events, events_ndjson).unwrap();
        Fixture {
            prefs: dir.path().join("prefs.json"),
            config: path_str(&config),
            events: path_str(&events),
            _dir: dir,
        }
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn replay_sends_all_valid_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/v2"))
            .and(query_param("access_token", "pk.replay"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let f = fixture(&server.uri());
        let summary = replay(&f.config, &path_str(&f.prefs), &f.events)
            .await
            .unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                lines: 5,
                invalid_lines: 1,
                queued: 3,
                dropped: 1,
                ignored: 0,
                // map.load with its turnstile, then the remaining two events
                batches: 2,
                events_sent: 4,
                accepted: 2,
                rejected: 0,
                failures: 0,
            }
        );

        let prefs = FilePreferenceStore::open(&f.prefs).unwrap();
        assert!(prefs.get(PREF_VENDOR_ID).is_some());
    }

    #[tokio::test]
    async fn replay_when_opted_out_only_sends_turnstile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/v2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri());
        FilePreferenceStore::open(&f.prefs)
            .unwrap()
            .set_bool(PREF_TELEMETRY_ENABLED, false)
            .unwrap();

        let summary = replay(&f.config, &path_str(&f.prefs), &f.events)
            .await
            .unwrap();
        assert_eq!(summary.ignored, 3);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.events_sent, 1);
    }

    #[tokio::test]
    async fn replay_counts_transport_failures() {
        // Nothing listens on port 1.
        let f = fixture("http://127.0.0.1:1");
        let summary = replay(&f.config, &path_str(&f.prefs), &f.events)
            .await
            .unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.accepted, 0);
    }

    #[tokio::test]
    async fn replay_waits_for_slow_server_instead_of_dropping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/v2"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let clicks = r#"{"event":"map.click","lat":38.9,"lng":-77.03}"#;
        let lines = vec![clicks; 6].join("\n");
        let f = fixture_with(&server.uri(), 2, &lines);
        let summary = replay(&f.config, &path_str(&f.prefs), &f.events)
            .await
            .unwrap();

        assert_eq!(summary.lines, 6);
        assert_eq!(summary.queued, 6);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.events_sent, 6);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.accepted, 3);
    }

    #[tokio::test]
    async fn replay_rejects_missing_file() {
        let f = fixture("http://127.0.0.1:1");
        assert!(replay(&f.config, &path_str(&f.prefs), "/nonexistent/events.ndjson")
            .await
            .is_err());
    }
}
