//! HTTP transport for event batches.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::config::TelemetryConfig;
use beacon_core::error::Result;
use beacon_core::models::event::KEY_LONGITUDE;
use beacon_core::models::location::wrap_longitude;
use beacon_core::models::{AttributeValue, Attributes, Event};

use crate::capabilities::{TransmissionClient, TransmissionOutcome};

/// Path appended to the configured base URL.
const EVENTS_PATH: &str = "/events/v2";

/// User-Agent prefixes the collection endpoint accepts.
pub const ACCEPTED_USER_AGENT_PREFIXES: [&str; 5] = [
    "MapboxEventsAndroid/",
    "MapboxTelemetryAndroid/",
    "MapboxEventsUnityAndroid/",
    "mapbox-navigation-android/",
    "mapbox-navigation-ui-android/",
];

#[derive(Debug, Clone)]
struct Settings {
    base_url: String,
    access_token: String,
    user_agent: String,
}

/// Posts batches as a JSON array of flat objects.
///
/// Never returns an error from [`TransmissionClient::send`]: a server answer
/// becomes [`TransmissionOutcome::Response`] and anything else becomes
/// [`TransmissionOutcome::Failure`].
pub struct HttpTransmissionClient {
    client: reqwest::Client,
    settings: RwLock<Settings>,
}

impl HttpTransmissionClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            settings: RwLock::new(Settings {
                base_url: base_url.into(),
                access_token: access_token.into(),
                user_agent: user_agent.into(),
            }),
        })
    }

    /// Endpoint, token, User-Agent and timeout resolved from configuration.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Self::new(
            config.events_base_url(),
            config.effective_access_token(),
            config.full_user_agent(),
            config.endpoint.request_timeout(),
        )
    }

    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Full URL batches are posted to, without the token.
    pub fn events_url(&self) -> String {
        events_url(&self.settings().base_url)
    }

    pub fn access_token(&self) -> String {
        self.settings().access_token
    }

    pub fn user_agent(&self) -> String {
        self.settings().user_agent
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .base_url = base_url.into();
    }

    /// Replace the token. Empty tokens are rejected and return false.
    pub fn set_access_token(&self, token: &str) -> bool {
        if token.trim().is_empty() {
            return false;
        }
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token = token.to_string();
        true
    }

    /// Replace the User-Agent. Only values starting with one of
    /// [`ACCEPTED_USER_AGENT_PREFIXES`] are accepted.
    pub fn set_user_agent(&self, user_agent: &str) -> bool {
        if !is_accepted_user_agent(user_agent) {
            return false;
        }
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user_agent = user_agent.to_string();
        true
    }
}

pub fn is_accepted_user_agent(user_agent: &str) -> bool {
    ACCEPTED_USER_AGENT_PREFIXES
        .iter()
        .any(|prefix| user_agent.starts_with(prefix))
}

fn events_url(base_url: &str) -> String {
    format!("{}{EVENTS_PATH}", base_url.trim_end_matches('/'))
}

/// Wire form of a batch: event attributes in append order, longitude wrapped.
pub fn wire_payload(batch: &[Event]) -> Vec<Attributes> {
    batch
        .iter()
        .map(|event| {
            let mut attrs = event.attributes().clone();
            if let Some(AttributeValue::Float(lng)) = attrs.get_mut(KEY_LONGITUDE) {
                *lng = wrap_longitude(*lng);
            }
            attrs
        })
        .collect()
}

#[async_trait]
impl TransmissionClient for HttpTransmissionClient {
    async fn send(&self, batch: Vec<Event>) -> TransmissionOutcome {
        let settings = self.settings();
        let payload = wire_payload(&batch);

        let request = self
            .client
            .post(events_url(&settings.base_url))
            .query(&[("access_token", settings.access_token.as_str())])
            .header(reqwest::header::USER_AGENT, settings.user_agent.as_str())
            .json(&payload);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::debug!(
                        status = %status,
                        events = batch.len(),
                        "telemetry batch accepted"
                    );
                } else {
                    tracing::warn!(
                        status = %status,
                        events = batch.len(),
                        "telemetry batch rejected by server"
                    );
                }
                TransmissionOutcome::Response {
                    success: status.is_success(),
                    status: status.as_u16(),
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    events = batch.len(),
                    "failed to submit telemetry batch"
                );
                TransmissionOutcome::Failure(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::models::{EventKind, LocationFix};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UA: &str = "MapboxTelemetryAndroid/3.0";

    fn client_for(base_url: &str, timeout: Duration) -> HttpTransmissionClient {
        HttpTransmissionClient::new(base_url, "pk.test", UA, timeout).unwrap()
    }

    fn sample_batch() -> Vec<Event> {
        let fix = LocationFix::new(38.9, 190.0);
        vec![
            Event::map_load(),
            Event::map_drag_end(&fix, 12.0).unwrap(),
        ]
    }

    #[tokio::test]
    async fn client_posts_batch_with_token_and_user_agent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/events/v2"))
            .and(query_param("access_token", "pk.test"))
            .and(header("user-agent", UA))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(5));
        let outcome = client.send(sample_batch()).await;

        assert_eq!(
            outcome,
            TransmissionOutcome::Response {
                success: true,
                status: 204
            }
        );
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn body_is_flat_array_with_wrapped_longitude() {
        let server = MockServer::start().await;
        let batch = sample_batch();
        let expected = serde_json::json!([
            {
                "event": "map.load",
                "created": batch[0].created().unwrap(),
            },
            {
                "event": "map.dragend",
                "created": batch[1].created().unwrap(),
                "lat": 38.9,
                "lng": -170.0,
                "zoom": 12.0,
            },
        ]);

        Mock::given(method("POST"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(5));
        assert!(client.send(batch).await.is_success());
    }

    #[tokio::test]
    async fn client_reports_server_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/events/v2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(5));
        let outcome = client.send(sample_batch()).await;

        assert_eq!(
            outcome,
            TransmissionOutcome::Response {
                success: false,
                status: 500
            }
        );
    }

    #[tokio::test]
    async fn client_handles_connection_refused() {
        // Nothing listens on port 1.
        let client = client_for("http://127.0.0.1:1", Duration::from_secs(5));
        let outcome = client.send(sample_batch()).await;
        assert!(matches!(outcome, TransmissionOutcome::Failure(_)));
    }

    #[tokio::test]
    async fn client_respects_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(1));

        let start = std::time::Instant::now();
        let outcome = client.send(sample_batch()).await;
        let elapsed = start.elapsed();

        assert!(matches!(outcome, TransmissionOutcome::Failure(_)));
        assert!(
            elapsed < Duration::from_secs(5),
            "client should have timed out, but took {:?}",
            elapsed
        );
    }

    #[test]
    fn user_agent_must_use_known_prefix() {
        let client = client_for("https://events.example.com", Duration::from_secs(5));
        assert!(!client.set_user_agent("curl/8.0"));
        assert_eq!(client.user_agent(), UA);

        assert!(client.set_user_agent("mapbox-navigation-android/0.9.0"));
        assert_eq!(client.user_agent(), "mapbox-navigation-android/0.9.0");
    }

    #[test]
    fn empty_access_token_is_rejected() {
        let client = client_for("https://events.example.com", Duration::from_secs(5));
        assert!(!client.set_access_token("  "));
        assert_eq!(client.access_token(), "pk.test");
        assert!(client.set_access_token("pk.other"));
        assert_eq!(client.access_token(), "pk.other");
    }

    #[test]
    fn from_config_resolves_endpoint() {
        let mut config = TelemetryConfig::new("pk.prod", UA);
        config.app_identifier = Some("com.example.app".into());
        let client = HttpTransmissionClient::from_config(&config).unwrap();
        assert_eq!(client.events_url(), "https://events.mapbox.com/events/v2");
        assert_eq!(client.user_agent(), format!("com.example.app {UA}"));

        config.endpoint.staging_url = Some("https://staging.example.com/".into());
        config.endpoint.staging_access_token = Some("pk.staging".into());
        let client = HttpTransmissionClient::from_config(&config).unwrap();
        assert_eq!(client.events_url(), "https://staging.example.com/events/v2");
        assert_eq!(client.access_token(), "pk.staging");

        config.endpoint.china = true;
        let client = HttpTransmissionClient::from_config(&config).unwrap();
        assert_eq!(client.events_url(), "https://events.mapbox.cn/events/v2");
        assert_eq!(client.access_token(), "pk.prod");

        client.set_base_url("http://localhost:9000");
        assert_eq!(client.events_url(), "http://localhost:9000/events/v2");
    }

    #[test]
    fn wire_payload_only_wraps_out_of_range_longitude() {
        let mut attrs = Attributes::new();
        attrs.insert(KEY_LONGITUDE.into(), (-77.5).into());
        let in_range = Event::new(EventKind::Location, attrs);
        let payload = wire_payload(&[in_range]);
        assert_eq!(
            payload[0].get(KEY_LONGITUDE),
            Some(&AttributeValue::Float(-77.5))
        );
    }
}
