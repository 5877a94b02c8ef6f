use std::fmt;

use serde::Serialize;

/// Opaque identifier for one capture session.
///
/// Composed of a millisecond timestamp and a random suffix, so ids sort by
/// creation time and collisions across concurrent devices are negligible.
/// Generated once per controller; every chunk upload and every flush for that
/// controller carries the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().simple();
        SessionId(format!("{}-{}", millis, nonce))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
