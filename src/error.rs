//! Custom error types for the application.
//!
//! This module defines the primary error type, `ControlError`, together with the
//! narrower error enums returned by the controller's operations. Using the
//! `thiserror` crate, it provides a centralized and consistent way to describe
//! everything that can go wrong between the operator and the measurement backend.
//!
//! ## Error Hierarchy
//!
//! - **`ControlError`**: crate-wide errors (configuration loading and validation,
//!   unknown instrument types, a stopped controller).
//! - **`DispatchError`**: the three terminal outcomes of a failed command
//!   dispatch. `LocalValidation` never reaches the network, `ServerRejected`
//!   carries a well-formed but unsuccessful response, and `Transport` means the
//!   request never completed.
//! - **`DetectError`**: failures of an instrument scan, including the in-flight
//!   guard that turns a concurrent scan into a no-op.
//! - **`BackendError`**: what a [`Backend`](crate::backend::Backend)
//!   implementation reports when a call does not produce a usable body.
//!
//! None of these errors is retried automatically. The controller converts them
//! into transient notices; callers of the handle still receive them for
//! scripting and tests.

use crate::instrument::InstrumentType;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ControlError>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A panel name did not match any slot
    #[error("Unknown instrument type '{0}' (expected power-supply, eload, daq or scope)")]
    UnknownInstrumentType(String),

    /// The controller task has exited
    #[error("Controller is not running")]
    ControllerStopped,
}

impl From<figment::Error> for ControlError {
    fn from(err: figment::Error) -> Self {
        ControlError::Config(Box::new(err))
    }
}

/// Pre-flight failures of a dispatch. These never touch the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalValidationError {
    /// The panel is unbound
    #[error("No instrument address selected for {0}")]
    NoAddressSelected(InstrumentType),

    /// A dispatch is in flight or settling
    #[error("Controls for {0} are disabled")]
    ControlsDisabled(InstrumentType),

    /// The action needs a form input that has no value
    #[error("Form input '{input}' is missing on the {panel} panel")]
    MissingFormValue {
        /// Panel slot
        panel: InstrumentType,
        /// Input id
        input: &'static str,
    },
}

/// Terminal outcome of a failed dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Refused before any request was sent
    #[error(transparent)]
    LocalValidation(#[from] LocalValidationError),

    /// The backend answered with `success == false`
    #[error("Server rejected the command: {}", .detail.as_deref().unwrap_or("no detail"))]
    ServerRejected {
        /// Server explanation, if any
        detail: Option<String>,
    },

    /// The request did not complete
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    /// True when the failure happened before any request was built.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, DispatchError::LocalValidation(_))
    }
}

/// Failure of an instrument scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// Another scan is running
    #[error("Detection already in progress")]
    AlreadyInFlight,

    /// The backend reported an unsuccessful scan
    #[error("Detection failed: {}", .detail.as_deref().unwrap_or("unknown error"))]
    ServerRejected {
        /// Server explanation, if any
        detail: Option<String>,
    },

    /// The scan request did not complete
    #[error("Transport error during detection: {0}")]
    Transport(String),
}

/// Errors reported by a backend collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection or I/O failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Non-ok HTTP-style status
    #[error("Backend answered with status {0}")]
    Status(u16),

    /// Body could not be decoded
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}
