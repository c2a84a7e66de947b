//! Measurement backend collaborator.
//!
//! The controller talks to the remote measurement backend only through the
//! [`Backend`] trait. Transport (HTTP, gRPC, in-process) is the implementor's
//! business; the controller only sees typed replies or a [`BackendError`].
//!
//! # Contract
//!
//! - Methods are async and take `&self`; implementations use interior
//!   mutability for any state.
//! - A call that produced a well-formed body returns `Ok`, even when the body
//!   reports a logical failure (`success == false`).
//! - `instrument_status` returns `Err(BackendError::Status(_))` for any non-ok
//!   response, including an endpoint that does not exist yet. The controller
//!   treats that as a polling-stop signal.

pub mod simulated;

use crate::instrument::InstrumentType;
use crate::protocol::{ClientIdentity, ControlRequest, ControlResult, ScanResponse, StatusFields};
use async_trait::async_trait;

pub use crate::error::BackendError;
pub use simulated::SimulatedBackend;

/// Remote measurement backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Trigger an instrument scan on the client agent.
    async fn scan_instruments(&self) -> Result<ScanResponse, BackendError>;

    /// Fetch this client's session identity.
    async fn client_identity(&self) -> Result<ClientIdentity, BackendError>;

    /// Execute one command. Sent exactly once per dispatch.
    async fn execute_command(&self, request: &ControlRequest) -> Result<ControlResult, BackendError>;

    /// Fetch live status fields for the instrument at `address`.
    async fn instrument_status(
        &self,
        instrument_type: InstrumentType,
        address: &str,
    ) -> Result<StatusFields, BackendError>;
}
