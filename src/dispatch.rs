//! Command Dispatcher
//!
//! Pure building blocks of a dispatch: turning a panel's form snapshot into a
//! [`ControlRequest`], deciding where a successful [`ControlResult`] is routed,
//! and classifying backend replies into the [`DispatchError`] taxonomy.
//!
//! The stateful part (controls disabled while in flight, settle delay,
//! re-validation after the await) lives in [`crate::controller`].
//!
//! # Payload rules
//!
//! | action                     | value                                         |
//! |----------------------------|-----------------------------------------------|
//! | `set_voltage`              | `value-power-supply-voltage`                  |
//! | `set_current` (eload)      | `value-eload-current`                         |
//! | `set_current` (other)      | `value-power-supply-current`                  |
//! | `set_trigger`              | `value-scope-trigger`                         |
//! | `read` on `daq`            | channel rows with a non-empty channel         |
//! | anything else              | none                                          |

use crate::error::{BackendError, DispatchError, LocalValidationError};
use crate::form::{
    FormValues, INPUT_ELOAD_CURRENT, INPUT_PSU_CURRENT, INPUT_PSU_VOLTAGE, INPUT_SCOPE_TRIGGER,
};
use crate::instrument::InstrumentType;
use crate::protocol::{ChannelRead, ControlRequest, ControlResult, ControlValue};
use serde::Serialize;

/// Action name for a multi-channel DAQ read.
pub const ACTION_READ: &str = "read";
/// Action name for a waveform capture.
pub const ACTION_GET_WAVEFORM: &str = "get_waveform";

/// Named input a scalar action reads its value from.
#[must_use]
pub fn value_input_for(panel: InstrumentType, action: &str) -> Option<&'static str> {
    match action {
        "set_voltage" => Some(INPUT_PSU_VOLTAGE),
        "set_current" if panel == InstrumentType::Eload => Some(INPUT_ELOAD_CURRENT),
        "set_current" => Some(INPUT_PSU_CURRENT),
        "set_trigger" => Some(INPUT_SCOPE_TRIGGER),
        _ => None,
    }
}

/// Channel list for a DAQ read: rows with a non-empty channel, in display order.
#[must_use]
pub fn channel_reads(form: &FormValues) -> Vec<ChannelRead> {
    form.channel_rows()
        .iter()
        .filter(|row| !row.channel.is_empty())
        .map(|row| ChannelRead::new(row.channel.clone(), row.unit.clone()))
        .collect()
}

/// Assemble the request for `action` on `panel` bound to `address`.
pub fn build_request(
    panel: InstrumentType,
    address: &str,
    action: &str,
    form: &FormValues,
) -> Result<ControlRequest, LocalValidationError> {
    let value = if panel == InstrumentType::Daq && action == ACTION_READ {
        Some(ControlValue::Channels(channel_reads(form)))
    } else if let Some(input) = value_input_for(panel, action) {
        let raw = form
            .input(input)
            .ok_or(LocalValidationError::MissingFormValue { panel, input })?;
        Some(ControlValue::Scalar(raw.to_string()))
    } else {
        None
    };

    Ok(ControlRequest {
        instrument_type: panel,
        address: address.to_string(),
        action: action.to_string(),
        value,
    })
}

/// Where a successful reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultRoute {
    /// DAQ result renderer (`daq` + `read`)
    DaqResults,
    /// Waveform renderer (`get_waveform`)
    Waveform,
    /// Success notice only
    NoticeOnly,
}

/// Route for a successful reply to `action` on `panel`.
#[must_use]
pub fn route_for(panel: InstrumentType, action: &str) -> ResultRoute {
    if panel == InstrumentType::Daq && action == ACTION_READ {
        ResultRoute::DaqResults
    } else if action == ACTION_GET_WAVEFORM {
        ResultRoute::Waveform
    } else {
        ResultRoute::NoticeOnly
    }
}

/// Classify a backend reply.
pub fn classify(reply: Result<ControlResult, BackendError>) -> Result<ControlResult, DispatchError> {
    match reply {
        Ok(result) if result.success => Ok(result),
        Ok(result) => Err(DispatchError::ServerRejected {
            detail: result.reason().map(str::to_string),
        }),
        Err(err) => Err(DispatchError::Transport(err.to_string())),
    }
}

/// Dispatch lifecycle of one panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum PanelActivity {
    /// No dispatch running; controls follow the binding
    #[default]
    Idle,
    /// A request is on the wire
    InFlight {
        /// Id of the running dispatch
        dispatch_id: u64,
        /// Address the request targets
        address: String,
        /// Action being run
        action: String,
    },
    /// Completed; controls re-enable after the settle delay
    Settling {
        /// Id of the completed dispatch
        dispatch_id: u64,
    },
}

impl PanelActivity {
    /// True while a request is on the wire.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }
}
