//! # ATE Instrument Control Core Library
//!
//! This crate is the client-side engine of the ATE instrument control system.
//! It lets an operator discover lab instruments (power supplies, electronic
//! loads, data-acquisition units, oscilloscopes) exposed by a remote
//! measurement backend, bind them to control panels, issue commands, and watch
//! their live status. Rendering is left to whichever frontend subscribes to the
//! controller's events; the `ate-control` binary is a terminal frontend over a
//! simulated bench.
//!
//! ## Crate Structure
//!
//! - **`controller`**: The actor that owns all session state and the cloneable
//!   `ControllerHandle` used to drive it.
//! - **`registry`**: Instruments found by the last detection, plus the
//!   detection in-flight guard.
//! - **`binding`**: Which address each panel is bound to, and whether its
//!   action controls are enabled.
//! - **`dispatch`**: Request assembly from form values, result routing and
//!   error classification.
//! - **`polling`**: One cancellable status polling task per bound panel.
//! - **`tracker`**: Client session identity and connectivity.
//! - **`view`**: Presentation state (notices, DAQ readouts, waveforms, status
//!   displays) and the `UiEvent` stream.
//! - **`backend`**: The `Backend` trait the controller talks to, and a
//!   simulated bench implementing it.
//! - **`form`**: The `FormSource` trait through which form inputs are read.
//! - **`protocol`**: Wire types exchanged with the backend.
//! - **`config`** / **`logging`**: Figment configuration and tracing setup.
//! - **`error`**: Error enums shared across the crate.

pub mod backend;
pub mod binding;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod form;
pub mod instrument;
pub mod logging;
pub mod messages;
pub mod polling;
pub mod protocol;
pub mod registry;
pub mod tracker;
pub mod view;

pub use controller::{Controller, ControllerHandle, ControllerSnapshot};
pub use error::{AppResult, ControlError, DetectError, DispatchError};
pub use instrument::{Instrument, InstrumentType};
