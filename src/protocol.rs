//! Wire types exchanged with the measurement backend.
//!
//! These mirror the JSON bodies of the backend's `scan-instruments`,
//! `client-identity`, `execute-command` and `instrument-status` calls. Unknown
//! fields are ignored so that newer backends stay compatible.

use crate::instrument::{Instrument, InstrumentType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One DAQ channel to read, paired with its measurement unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRead {
    /// Channel identifier as typed by the operator (e.g. `"102"`)
    pub channel: String,
    /// Unit selector (`VOLT`, `RES`, `TEMP`, ...)
    pub unit: String,
}

impl ChannelRead {
    /// Create a channel read entry.
    pub fn new(channel: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            unit: unit.into(),
        }
    }
}

/// Action-dependent payload of a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    /// Single scalar for set-style actions
    Scalar(String),
    /// Ordered channel list for multi-channel reads
    Channels(Vec<ChannelRead>),
}

/// Command sent to the backend. Built fresh for every dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Panel slot the command comes from
    pub instrument_type: InstrumentType,
    /// Target instrument address
    pub address: String,
    /// Action name (`on`, `set_voltage`, `read`, ...)
    pub action: String,
    /// Payload, present only for actions that take one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ControlValue>,
}

/// Per-channel reading: a number, or whatever the backend sent instead
/// (an error string, `null`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelReading {
    /// Numeric reading
    Number(f64),
    /// Anything else, kept verbatim
    Error(serde_json::Value),
}

impl ChannelReading {
    /// Returns the numeric value if this reading is a finite number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

/// Waveform body returned by `get_waveform`. Either axis may be missing in
/// malformed replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformData {
    /// Time axis
    #[serde(default)]
    pub x: Option<Vec<f64>>,
    /// Amplitude axis
    #[serde(default)]
    pub y: Option<Vec<f64>>,
}

/// Reply to an `execute-command` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlResult {
    /// Whether the instrument accepted the command
    #[serde(default)]
    pub success: bool,
    /// Failure explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Free-form server message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// DAQ readings keyed by channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, ChannelReading>>,
    /// Waveform body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<WaveformData>,
}

impl ControlResult {
    /// Successful reply with an optional message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Rejected reply carrying a `detail`.
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
            ..Default::default()
        }
    }

    /// Server-provided explanation: `detail` wins over `message`.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.message.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Reply to a `scan-instruments` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    /// Whether the scan ran
    #[serde(default)]
    pub success: bool,
    /// Instruments found, in backend order
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    /// Failure explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Reply to a `client-identity` request. Only the length of `instruments` is
/// used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Client IP
    #[serde(default)]
    pub ip: Option<String>,
    /// Session id
    #[serde(default)]
    pub session_id: Option<String>,
    /// Agent status (`connected`, ...)
    #[serde(default)]
    pub status: Option<String>,
    /// Instruments known for this client
    #[serde(default)]
    pub instruments: Vec<serde_json::Value>,
}

/// Free-form status fields from `instrument-status`.
pub type StatusFields = serde_json::Map<String, serde_json::Value>;
