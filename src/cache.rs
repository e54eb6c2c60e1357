//! Session caching without a store.
//!
//! An assumed-role session stays usable for its whole duration, so the token
//! issued by one invocation can be reused by the next. The session name is a
//! time-ordered UUID: its embedded creation time doubles as the expiry clock,
//! which means validity can be decided from the name alone.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;
use uuid::Uuid;

use crate::error::{AwsenvError, Result};

/// A previously issued temporary session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub name: String,
    pub token: String,
    pub profile: String,
}

impl CachedSession {
    pub fn new(
        name: impl Into<String>,
        token: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            profile: profile.into(),
        }
    }

    /// Whether this session was issued for `profile`.
    pub fn belongs_to(&self, profile: &str) -> bool {
        self.profile == profile
    }
}

/// Produce a fresh, time-ordered session name.
///
/// The name is a version 7 UUID in simple (hex) form, which also satisfies the
/// STS `RoleSessionName` character set.
pub fn generate_session_name() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Recover the creation time embedded in a session name.
///
/// Accepts any time-based UUID (v1, v6, v7) in simple or hyphenated form.
pub fn decode_timestamp(name: &str) -> Result<f64> {
    let uuid =
        Uuid::try_parse(name).map_err(|_| AwsenvError::InvalidSessionName(name.to_string()))?;

    let (seconds, nanos) = uuid
        .get_timestamp()
        .ok_or_else(|| AwsenvError::InvalidSessionName(name.to_string()))?
        .to_unix();

    Ok(seconds as f64 + f64::from(nanos) / 1e9)
}

/// Load a cached session if every field is present and it has not expired.
///
/// Field presence is checked before the timestamp. A name that cannot be
/// decoded counts as a cache miss. Expiry is inclusive: a session whose
/// `created + duration` equals `now` is still valid.
pub fn load(
    name: Option<&str>,
    token: Option<&str>,
    profile: Option<&str>,
    now: f64,
    session_duration: i32,
) -> Option<CachedSession> {
    let (name, token, profile) = match (non_empty(name), non_empty(token), non_empty(profile)) {
        (Some(name), Some(token), Some(profile)) => (name, token, profile),
        _ => {
            debug!("No cached session present");
            return None;
        }
    };

    let created = match decode_timestamp(name) {
        Ok(created) => created,
        Err(e) => {
            debug!("Ignoring cached session: {}", e);
            return None;
        }
    };

    if created + f64::from(session_duration) < now {
        debug!("Cached session {} has expired", name);
        return None;
    }

    debug!("Cached session {} is valid for profile {}", name, profile);
    Some(CachedSession::new(name, token, profile))
}

/// Current time in Unix-epoch seconds.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) fn session_name_at(seconds: u64) -> String {
    uuid::Builder::from_unix_timestamp_millis(seconds * 1000, &[0; 10])
        .into_uuid()
        .simple()
        .to_string()
}
