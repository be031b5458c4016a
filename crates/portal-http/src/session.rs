//! Session records.
//!
//! The backend identifies the caller through two headers built from a locally
//! persisted session record. A missing or malformed record is not an error:
//! requests simply go out without the headers and the server decides.

use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Header carrying the session identifier.
pub const SESSION_ID_HEADER: &str = "X-Session-ID";

/// Header carrying the numeric user identifier.
pub const PK_USER_HEADER: &str = "X-Pk-User";

/// The locally persisted identity of the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Opaque session identifier.
    pub session_id: String,
    /// Numeric user identifier.
    pub pk_user: i64,
}

impl Session {
    /// Creates a session record.
    #[must_use]
    pub fn new(session_id: impl Into<String>, pk_user: i64) -> Self {
        Self {
            session_id: session_id.into(),
            pk_user,
        }
    }

    /// Parses a stored record, returning `None` if it is malformed.
    ///
    /// `pkUser` may be stored as a number or a numeric string.
    #[must_use]
    pub fn parse(payload: &str) -> Option<Self> {
        let raw: RawSession = serde_json::from_str(payload).ok()?;
        let session_id = raw.session_id.filter(|id| !id.trim().is_empty())?;
        let pk_user = match raw.pk_user? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Self {
            session_id,
            pk_user,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    #[serde(alias = "session_id", alias = "sessionID")]
    session_id: Option<String>,
    #[serde(alias = "pk_user")]
    pk_user: Option<Value>,
}

/// Provides the current session record, if any.
pub trait SessionSource: Send + Sync + Debug {
    /// Returns the current session, or `None` to send unauthenticated requests.
    fn current(&self) -> Option<Session>;
}

/// No session at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl SessionSource for Anonymous {
    fn current(&self) -> Option<Session> {
        None
    }
}

/// A fixed session, for tests and embedded use.
#[derive(Debug, Clone)]
pub struct StaticSession(pub Session);

impl SessionSource for StaticSession {
    fn current(&self) -> Option<Session> {
        Some(self.0.clone())
    }
}

/// Session record read from a JSON file on every request.
///
/// The file is re-read each time so that signing in or out elsewhere is picked
/// up without restarting.
#[derive(Debug, Clone)]
pub struct FileSession {
    path: PathBuf,
}

impl FileSession {
    /// Reads the session from `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SessionSource for FileSession {
    fn current(&self) -> Option<Session> {
        let payload = match fs::read_to_string(&self.path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "No session file");
                return None;
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Unreadable session file");
                return None;
            }
        };

        let session = Session::parse(&payload);
        if session.is_none() {
            debug!(path = %self.path.display(), "Malformed session record, sending without identity");
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_record() {
        assert_eq!(
            Session::parse(r#"{"sessionId":"abc","pkUser":42}"#),
            Some(Session::new("abc", 42))
        );
        assert_eq!(
            Session::parse(r#"{"session_id":"abc","pk_user":"42"}"#),
            Some(Session::new("abc", 42))
        );
    }

    #[test]
    fn test_malformed_session_record() {
        assert_eq!(Session::parse("not json"), None);
        assert_eq!(Session::parse(r#"{"sessionId":"abc"}"#), None);
        assert_eq!(Session::parse(r#"{"sessionId":"","pkUser":1}"#), None);
        assert_eq!(Session::parse(r#"{"sessionId":"abc","pkUser":"x"}"#), None);
        assert_eq!(Session::parse(r#"{"sessionId":"abc","pkUser":[1]}"#), None);
    }

    #[test]
    fn test_file_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let source = FileSession::new(&path);

        assert_eq!(source.current(), None);

        fs::write(&path, r#"{"sessionId":"s-1","pkUser":7}"#).unwrap();
        assert_eq!(source.current(), Some(Session::new("s-1", 7)));

        fs::write(&path, "{").unwrap();
        assert_eq!(source.current(), None);
    }
}
