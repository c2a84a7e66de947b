//! Message types for actor-based communication.
//!
//! Commands flow from any number of [`ControllerHandle`](crate::controller::ControllerHandle)
//! clones to the single controller task over an mpsc channel. Each command
//! carries a oneshot sender for its reply.
//!
//! # Message Flow
//!
//! ```text
//! Caller                              Controller Task
//! ------                              ---------------
//! 1. Create command with oneshot
//! 2. Send via mpsc channel    ------>
//!                                     3. Receive command
//!                                     4. Mutate state, spawn network call
//!                                     5. Completion arrives as ControllerEvent
//!                                     6. Re-validate, apply, reply
//! 7. Await oneshot receiver   <------
//! ```
//!
//! Network calls and timers never touch controller state directly: they run
//! as spawned tasks and post a [`ControllerEvent`] back to the controller,
//! tagged with the ids the controller needs to discard stale completions.

use crate::binding::BindingChange;
use crate::controller::ControllerSnapshot;
use crate::error::{BackendError, DetectError, DispatchError};
use crate::instrument::{Instrument, InstrumentType};
use crate::protocol::{
    ClientIdentity, ControlRequest, ControlResult, ScanResponse, StatusFields,
};
use crate::tracker::ClientSessionInfo;
use crate::view::NoticeScope;
use tokio::sync::oneshot;

/// Commands accepted by the controller.
#[derive(Debug)]
pub enum ControllerCommand {
    /// Scan for instruments. Replies when the scan completes.
    Detect {
        /// Reply channel
        response: oneshot::Sender<Result<Vec<Instrument>, DetectError>>,
    },

    /// Select (or clear, with an empty address) the instrument of a panel.
    SetBinding {
        /// Panel slot
        panel: InstrumentType,
        /// Address to select; empty clears
        address: String,
        /// Reply channel
        response: oneshot::Sender<BindingChange>,
    },

    /// Read a panel's selected address.
    GetBinding {
        /// Panel slot
        panel: InstrumentType,
        /// Reply channel
        response: oneshot::Sender<Option<String>>,
    },

    /// Run an action on a panel. Replies when the backend answers, or
    /// immediately for local validation failures.
    Dispatch {
        /// Panel slot
        panel: InstrumentType,
        /// Action name
        action: String,
        /// Reply channel
        response: oneshot::Sender<Result<ControlResult, DispatchError>>,
    },

    /// Refresh the client identity now. Replies with the resulting info.
    RefreshSession {
        /// Reply channel
        response: oneshot::Sender<ClientSessionInfo>,
    },

    /// Copy of the full presentation state.
    Snapshot {
        /// Reply channel
        response: oneshot::Sender<ControllerSnapshot>,
    },

    /// Cancel every task and stop the controller.
    Shutdown {
        /// Reply channel
        response: oneshot::Sender<()>,
    },
}

impl ControllerCommand {
    /// Helper to create a Detect command
    pub fn detect() -> (Self, oneshot::Receiver<Result<Vec<Instrument>, DetectError>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Detect { response: tx }, rx)
    }

    /// Helper to create a SetBinding command
    pub fn set_binding(
        panel: InstrumentType,
        address: impl Into<String>,
    ) -> (Self, oneshot::Receiver<BindingChange>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::SetBinding {
                panel,
                address: address.into(),
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a GetBinding command
    pub fn get_binding(panel: InstrumentType) -> (Self, oneshot::Receiver<Option<String>>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetBinding { panel, response: tx }, rx)
    }

    /// Helper to create a Dispatch command
    pub fn dispatch(
        panel: InstrumentType,
        action: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<ControlResult, DispatchError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Dispatch {
                panel,
                action: action.into(),
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a RefreshSession command
    pub fn refresh_session() -> (Self, oneshot::Receiver<ClientSessionInfo>) {
        let (tx, rx) = oneshot::channel();
        (Self::RefreshSession { response: tx }, rx)
    }

    /// Helper to create a Snapshot command
    pub fn snapshot() -> (Self, oneshot::Receiver<ControllerSnapshot>) {
        let (tx, rx) = oneshot::channel();
        (Self::Snapshot { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}

/// Completions posted back to the controller by its spawned tasks.
#[derive(Debug)]
pub enum ControllerEvent {
    /// A scan finished.
    DetectFinished {
        /// Backend reply
        outcome: Result<ScanResponse, BackendError>,
    },

    /// A dispatch finished.
    DispatchFinished {
        /// Panel slot
        panel: InstrumentType,
        /// Dispatch the completion belongs to
        dispatch_id: u64,
        /// Request that was sent
        request: ControlRequest,
        /// Backend reply
        outcome: Result<ControlResult, BackendError>,
    },

    /// The settle delay after a dispatch elapsed.
    SettleElapsed {
        /// Panel slot
        panel: InstrumentType,
        /// Dispatch the completion belongs to
        dispatch_id: u64,
    },

    /// A polling tick finished.
    PollResult {
        /// Panel slot
        panel: InstrumentType,
        /// Polling session the result belongs to
        session_id: u64,
        /// Backend reply
        outcome: Result<StatusFields, BackendError>,
    },

    /// A client identity fetch finished.
    SessionRefreshed {
        /// Backend reply
        outcome: Result<ClientIdentity, BackendError>,
    },

    /// An info/success notice reached its deadline.
    NoticeExpired {
        /// Where the notice is shown
        scope: NoticeScope,
        /// Notice id
        id: u64,
    },
}
