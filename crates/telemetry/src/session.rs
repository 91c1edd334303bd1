//! Anonymous session token with time-based rotation.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Session token plus the instant it was issued.
///
/// The token is random (UUID v4) and never derived from user input.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    id: String,
    created_at: DateTime<Utc>,
    window: Duration,
}

impl SessionIdentity {
    /// Issue a fresh identity that rotates after `window`.
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Utc::now())
    }

    /// Issue a fresh identity as of `now`.
    pub fn starting_at(window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: new_token(),
            created_at: now,
            window,
        }
    }

    /// Rotation window expressed in hours.
    pub fn window_from_hours(hours: u32) -> Duration {
        Duration::hours(i64::from(hours))
    }

    /// The active session token.
    pub fn current(&self) -> &str {
        &self.id
    }

    /// When the active token was issued.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Change the rotation window. Takes effect on the next rotation check.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Rotate when the window has elapsed. Returns whether a new token was issued.
    pub fn rotate_if_due(&mut self) -> bool {
        self.rotate_if_due_at(Utc::now())
    }

    /// [`Self::rotate_if_due`] against an explicit clock.
    pub fn rotate_if_due_at(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.created_at <= self.window {
            return false;
        }
        self.id = new_token();
        self.created_at = now;
        true
    }

    /// SHA-256 hex digest of the token, for records that also carry the vendor id.
    pub fn hashed(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn rotation_is_idempotent_within_window() {
        let mut session = SessionIdentity::starting_at(Duration::hours(24), start());
        let original = session.current().to_string();

        for minutes in [0, 1, 60, 23 * 60, 24 * 60] {
            assert!(!session.rotate_if_due_at(start() + Duration::minutes(minutes)));
            assert_eq!(session.current(), original);
        }
        assert_eq!(session.created_at(), start());
    }

    #[test]
    fn rotates_exactly_once_after_window() {
        let mut session = SessionIdentity::starting_at(Duration::hours(24), start());
        let original = session.current().to_string();

        let later = start() + Duration::hours(24) + Duration::seconds(1);
        assert!(session.rotate_if_due_at(later));
        let rotated = session.current().to_string();
        assert_ne!(rotated, original);
        assert_eq!(session.created_at(), later);

        assert!(!session.rotate_if_due_at(later + Duration::minutes(5)));
        assert_eq!(session.current(), rotated);
    }

    #[test]
    fn shorter_window_applies_on_next_check() {
        let mut session = SessionIdentity::starting_at(Duration::hours(24), start());
        session.set_window(SessionIdentity::window_from_hours(1));
        assert_eq!(session.window(), Duration::hours(1));
        assert!(session.rotate_if_due_at(start() + Duration::minutes(61)));
    }

    #[test]
    fn tokens_are_unique_uuids() {
        let a = SessionIdentity::new(Duration::hours(1));
        let b = SessionIdentity::new(Duration::hours(1));
        assert_ne!(a.current(), b.current());
        assert!(Uuid::parse_str(a.current()).is_ok());
    }

    #[test]
    fn hashed_token_is_stable_hex_and_differs_from_cleartext() {
        let session = SessionIdentity::new(Duration::hours(1));
        let hashed = session.hashed();
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hashed, session.hashed());
        assert!(!hashed.contains(session.current()));
    }
}
