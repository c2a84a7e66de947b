//! Presentation state produced for the UI layer.
//!
//! The controller keeps a per-panel [`PanelView`] and publishes every change
//! as a [`UiEvent`] on a broadcast channel. Renderers (egui, web, terminal)
//! subscribe to the events or poll a snapshot; none of them is part of this
//! crate.

use crate::instrument::{Instrument, InstrumentType};
use crate::protocol::{ChannelRead, ChannelReading, StatusFields, WaveformData};
use crate::tracker::ClientSessionInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Notice severity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Progress or informational text
    Info,
    /// Completed operation
    Success,
    /// Failure; stays until replaced
    Error,
}

impl Severity {
    /// Info and success notices disappear on their own.
    #[must_use]
    pub fn auto_clears(self) -> bool {
        matches!(self, Self::Info | Self::Success)
    }
}

/// Where a notice is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NoticeScope {
    /// The global status bar (detection, session identity)
    Global,
    /// The status line of one panel
    Panel(InstrumentType),
}

/// A transient status message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    /// Monotonic id; auto-clear only removes the notice it was scheduled for
    pub id: u64,
    /// Where it is shown
    pub scope: NoticeScope,
    /// Severity tag
    pub severity: Severity,
    /// Text
    pub message: String,
    /// Wall-clock time it was shown
    pub issued_at: DateTime<Utc>,
    /// Auto-clear deadline for info/success notices
    #[serde(skip)]
    pub expires_at: Option<Instant>,
}

/// Rendered value of one requested DAQ channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChannelReadout {
    /// Numeric reading with its display unit
    Value {
        /// Reading
        value: f64,
        /// Unit symbol (`V`, `Ω`, `°C`)
        symbol: String,
    },
    /// The backend returned something that is not a number
    ReadFailed,
    /// The channel was requested but the backend returned nothing for it
    Missing,
}

impl ChannelReadout {
    /// Text shown next to the channel row.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Value { value, symbol } => format!("{value:.4} {symbol}"),
            Self::ReadFailed => "read failed".to_string(),
            Self::Missing => "no value returned".to_string(),
        }
    }

    /// True for the two error renderings.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Value { .. })
    }
}

/// Display symbol for a unit selector value.
#[must_use]
pub fn unit_symbol(unit: &str) -> &str {
    match unit {
        "VOLT" => "V",
        "RES" => "Ω",
        "TEMP" => "°C",
        other => other,
    }
}

/// DAQ results, one entry per requested channel row in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DaqReadout {
    /// `(channel, readout)` pairs; a channel requested twice appears twice
    pub channels: Vec<(String, ChannelReadout)>,
}

impl DaqReadout {
    /// Render `results` for the channels that were requested.
    ///
    /// Channels the backend answered but nobody asked for are ignored.
    pub fn render(
        requested: &[ChannelRead],
        results: Option<&BTreeMap<String, ChannelReading>>,
    ) -> Self {
        let channels = requested
            .iter()
            .map(|read| {
                let readout = match results.and_then(|r| r.get(&read.channel)) {
                    Some(reading) => match reading.as_number() {
                        Some(value) => ChannelReadout::Value {
                            value,
                            symbol: unit_symbol(&read.unit).to_string(),
                        },
                        None => ChannelReadout::ReadFailed,
                    },
                    None => ChannelReadout::Missing,
                };
                (read.channel.clone(), readout)
            })
            .collect();
        Self { channels }
    }

    /// Readout of the first row for `channel`.
    #[must_use]
    pub fn get(&self, channel: &str) -> Option<&ChannelReadout> {
        self.channels
            .iter()
            .find(|(id, _)| id == channel)
            .map(|(_, readout)| readout)
    }
}

/// Waveform renderer input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WaveformView {
    /// Both axes present
    Series {
        /// Time axis
        x: Vec<f64>,
        /// Amplitude axis
        y: Vec<f64>,
    },
    /// Reply lacked one of the axes
    Invalid,
}

impl WaveformView {
    /// Validate a waveform body.
    pub fn from_data(data: Option<WaveformData>) -> Self {
        match data {
            Some(WaveformData {
                x: Some(x),
                y: Some(y),
            }) => Self::Series { x, y },
            _ => Self::Invalid,
        }
    }
}

/// One label/value line of a panel's live status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusItem {
    /// Field label (`State`, `Voltage`, ...)
    pub label: &'static str,
    /// Rendered value
    pub value: String,
}

/// Live status display fed by polling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    /// Lines in display order; empty for panels without status fields
    pub items: Vec<StatusItem>,
}

fn field_text(fields: &StatusFields, key: &str, fallback: &str) -> String {
    match fields.get(key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        Some(serde_json::Value::Bool(true)) => "true".to_string(),
        _ => fallback.to_string(),
    }
}

impl StatusDisplay {
    /// Render status fields for `panel`. Only power supplies and loads have a
    /// status layout; other panels render nothing.
    pub fn render(panel: InstrumentType, fields: &StatusFields) -> Self {
        let items = match panel {
            InstrumentType::PowerSupply => vec![
                StatusItem {
                    label: "State",
                    value: field_text(fields, "output", "N/A"),
                },
                StatusItem {
                    label: "Voltage",
                    value: format!("{} V", field_text(fields, "voltage", "0.00")),
                },
                StatusItem {
                    label: "Current",
                    value: format!("{} A", field_text(fields, "current", "0.00")),
                },
            ],
            InstrumentType::Eload => vec![
                StatusItem {
                    label: "State",
                    value: field_text(fields, "output", "N/A"),
                },
                StatusItem {
                    label: "Current",
                    value: format!("{} A", field_text(fields, "current", "0.00")),
                },
            ],
            InstrumentType::Daq | InstrumentType::Scope => Vec::new(),
        };
        Self { items }
    }
}

/// Event published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UiEvent {
    /// The detect control changed state
    DetectControl {
        /// New state
        enabled: bool,
    },
    /// New selection options for every panel (empty list = "No instruments found")
    InstrumentsChanged {
        /// Full new list
        instruments: Vec<Instrument>,
    },
    /// A panel's binding changed
    BindingChanged {
        /// Panel slot
        panel: InstrumentType,
        /// New address, `None` when cleared
        address: Option<String>,
    },
    /// A panel's action controls were enabled or disabled
    ControlsEnabled {
        /// Panel slot
        panel: InstrumentType,
        /// New state
        enabled: bool,
    },
    /// A notice was shown
    NoticeShown(Notice),
    /// A notice was cleared
    NoticeCleared {
        /// Where it was shown
        scope: NoticeScope,
        /// Id of the cleared notice
        id: u64,
    },
    /// Fresh DAQ results
    DaqResults(DaqReadout),
    /// Fresh waveform for a panel
    Waveform {
        /// Panel slot
        panel: InstrumentType,
        /// Validated waveform
        waveform: WaveformView,
    },
    /// Fresh live status for a panel
    Status {
        /// Panel slot
        panel: InstrumentType,
        /// Rendered status lines
        display: StatusDisplay,
    },
    /// Polling started (`Some`) or stopped (`None`) for a panel
    Polling {
        /// Panel slot
        panel: InstrumentType,
        /// Polled address, `None` when stopped
        address: Option<String>,
    },
    /// Client session identity refreshed or connectivity changed
    Session(ClientSessionInfo),
}
