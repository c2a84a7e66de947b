//! Status/Session Tracker
//!
//! Keeps the last known client identity (IP, session id, backend status and
//! instrument count) and a connectivity indicator. Refreshes are wholesale; a
//! failed refresh only flips the indicator and keeps the identity fields that
//! were shown before.

use crate::protocol::ClientIdentity;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Placeholder shown for identity fields the backend did not report.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Connectivity indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Connectivity {
    /// No refresh has completed yet
    #[default]
    Unknown,
    /// Backend reports the client agent as connected
    Connected,
    /// Refresh failed or backend reports any other status
    ConnectionError,
}

impl Connectivity {
    /// Returns a short status label for UI display.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Connected => "Connected",
            Self::ConnectionError => "Connection error",
        }
    }
}

/// Client/session identity as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSessionInfo {
    /// Client IP as seen by the backend
    pub ip: String,
    /// Backend-assigned session id
    pub session_id: String,
    /// Raw status string of the client agent
    pub status: String,
    /// Instruments the backend knows for this client
    pub instrument_count: usize,
    /// Indicator derived from `status` and refresh failures
    pub connectivity: Connectivity,
    /// When the identity fields were last replaced
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for ClientSessionInfo {
    fn default() -> Self {
        Self {
            ip: UNKNOWN_FIELD.to_string(),
            session_id: UNKNOWN_FIELD.to_string(),
            status: UNKNOWN_FIELD.to_string(),
            instrument_count: 0,
            connectivity: Connectivity::Unknown,
            refreshed_at: None,
        }
    }
}

/// Holds the current [`ClientSessionInfo`].
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    info: ClientSessionInfo,
    consecutive_failures: u32,
}

impl SessionTracker {
    /// Tracker with unknown identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current identity and connectivity.
    #[must_use]
    pub fn info(&self) -> &ClientSessionInfo {
        &self.info
    }

    /// Replace the identity with a fresh reply.
    pub fn record_identity(&mut self, identity: ClientIdentity) -> &ClientSessionInfo {
        let status = identity.status.unwrap_or_default();
        let connectivity = if status == "connected" {
            Connectivity::Connected
        } else {
            Connectivity::ConnectionError
        };
        self.info = ClientSessionInfo {
            ip: non_empty_or_unknown(identity.ip),
            session_id: non_empty_or_unknown(identity.session_id),
            status,
            instrument_count: identity.instruments.len(),
            connectivity,
            refreshed_at: Some(Utc::now()),
        };
        self.consecutive_failures = 0;
        &self.info
    }

    /// Record a failed refresh; identity fields are preserved.
    pub fn record_failure(&mut self, error: &str) -> &ClientSessionInfo {
        self.consecutive_failures += 1;
        self.info.connectivity = Connectivity::ConnectionError;
        tracing::debug!(
            failures = self.consecutive_failures,
            error,
            "Session identity refresh failed"
        );
        &self.info
    }
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN_FIELD.to_string())
}
