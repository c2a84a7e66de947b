//! Controller actor: the instrument session and command-dispatch engine.
//!
//! The [`Controller`] is the single owner of every piece of session state:
//! the instrument registry, the panel binding table, per-panel dispatch
//! activity, polling sessions, notices and the client session identity. It
//! runs in a dedicated Tokio task and processes [`ControllerCommand`]s from
//! [`ControllerHandle`]s sequentially.
//!
//! # Concurrency
//!
//! The actor never awaits the network itself. Each backend call or timer is a
//! spawned task that posts a [`ControllerEvent`] back into the actor's internal
//! channel. Every completion is re-validated against the state it was started
//! from before it is applied:
//!
//! - dispatch completions carry a dispatch id and are dropped unless the panel
//!   is still in flight with that id;
//! - poll results carry a session id and are dropped unless that session is
//!   still the panel's live one;
//! - notice expiries carry a notice id and only clear that notice.
//!
//! Rebinding a panel to a different address (or clearing it) aborts the panel's
//! in-flight dispatch before the new binding is in place, so no request using
//! the stale address can complete afterwards.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ate_control::{
//!     backend::SimulatedBackend, config::ControllerConfig, controller::Controller,
//!     form::StaticForms, instrument::InstrumentType,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handle = Controller::spawn(
//!     ControllerConfig::default(),
//!     Arc::new(SimulatedBackend::new()),
//!     Arc::new(StaticForms::new()),
//! );
//! let instruments = handle.detect().await?;
//! handle.set_binding(InstrumentType::PowerSupply, &instruments[0].address).await?;
//! let result = handle.dispatch(InstrumentType::PowerSupply, "on").await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

use crate::backend::Backend;
use crate::binding::{BindingChange, PanelBinding, PanelBindingTable};
use crate::config::ControllerConfig;
use crate::dispatch::{self, PanelActivity, ResultRoute};
use crate::error::{
    AppResult, BackendError, ControlError, DetectError, DispatchError, LocalValidationError,
};
use crate::form::FormSource;
use crate::instrument::{Instrument, InstrumentType};
use crate::messages::{ControllerCommand, ControllerEvent};
use crate::polling::{PollingInfo, PollingManager};
use crate::protocol::{
    ChannelRead, ClientIdentity, ControlRequest, ControlResult, ControlValue, ScanResponse,
    StatusFields,
};
use crate::registry::InstrumentRegistry;
use crate::tracker::{ClientSessionInfo, SessionTracker};
use crate::view::{
    DaqReadout, Notice, NoticeScope, Severity, StatusDisplay, UiEvent, WaveformView,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Global notice shown when the controller starts.
pub const WELCOME_TEXT: &str = "Welcome to the ATE instrument control system";
/// Global notice shown while a scan runs.
pub const SCANNING_TEXT: &str = "Scanning for instruments...";
/// Global notice for a scan that failed in transport.
pub const DETECT_NETWORK_ERROR_TEXT: &str = "Network error during detection";
/// Panel notice for a dispatch without a selected address.
pub const SELECT_ADDRESS_TEXT: &str = "Select an instrument address first";
/// Panel notice for a successful dispatch.
pub const OPERATION_SUCCEEDED_TEXT: &str = "Operation succeeded";
/// Panel notice for a dispatch that failed without a server explanation.
pub const OPERATION_NETWORK_ERROR_TEXT: &str = "Network error during operation";
/// Instrument list text when the last scan found nothing.
pub const NO_INSTRUMENTS_TEXT: &str = "No instruments found";

const CANCELLED_REBOUND: &str = "request cancelled: panel rebound";
const CANCELLED_SHUTDOWN: &str = "request cancelled: controller shut down";

/// Presentation state of one panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    /// Selected address and control enablement
    pub binding: PanelBinding,
    /// Dispatch lifecycle
    pub activity: PanelActivity,
    /// Addresses offered by the address selector
    pub options: Vec<String>,
    /// Panel status line
    pub notice: Option<Notice>,
    /// Last DAQ readout (DAQ panel only)
    pub daq: Option<DaqReadout>,
    /// Last waveform (scope panel only)
    pub waveform: Option<WaveformView>,
    /// Live status from polling
    pub status: StatusDisplay,
    /// Live polling session, if any
    pub polling: Option<PollingInfo>,
}

/// Copy of the controller's presentation state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// Instruments found by the last successful detection
    pub instruments: Vec<Instrument>,
    /// True while a scan is in flight
    pub detecting: bool,
    /// Count of successful detections
    pub detection_generation: u64,
    /// Every panel, keyed by slot
    pub panels: BTreeMap<InstrumentType, PanelView>,
    /// Global status bar
    pub global_notice: Option<Notice>,
    /// Client session identity
    pub session: ClientSessionInfo,
}

impl ControllerSnapshot {
    /// View of one panel.
    #[must_use]
    pub fn panel(&self, panel: InstrumentType) -> Option<&PanelView> {
        self.panels.get(&panel)
    }

    /// Lines of the instrument list.
    #[must_use]
    pub fn instrument_list(&self) -> Vec<String> {
        if self.instruments.is_empty() {
            vec![NO_INSTRUMENTS_TEXT.to_string()]
        } else {
            self.instruments.iter().map(Instrument::option_label).collect()
        }
    }

    /// Number of panels with a live polling session.
    #[must_use]
    pub fn polling_count(&self) -> usize {
        self.panels.values().filter(|p| p.polling.is_some()).count()
    }
}

struct PendingDispatch {
    dispatch_id: u64,
    handle: JoinHandle<()>,
    response: oneshot::Sender<Result<ControlResult, DispatchError>>,
}

#[derive(Default)]
struct PanelState {
    activity: PanelActivity,
    pending: Option<PendingDispatch>,
    notice: Option<Notice>,
    daq: Option<DaqReadout>,
    waveform: Option<WaveformView>,
    status: StatusDisplay,
}

/// Cloneable handle to a running [`Controller`].
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControllerCommand>,
    events: broadcast::Sender<UiEvent>,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        (command, rx): (ControllerCommand, oneshot::Receiver<T>),
    ) -> AppResult<T> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControlError::ControllerStopped)?;
        rx.await.map_err(|_| ControlError::ControllerStopped)
    }

    /// Scan for instruments. A second call while a scan runs fails with
    /// [`DetectError::AlreadyInFlight`] without touching the network.
    pub async fn detect(&self) -> Result<Vec<Instrument>, DetectError> {
        match self.request(ControllerCommand::detect()).await {
            Ok(result) => result,
            Err(e) => Err(DetectError::Transport(e.to_string())),
        }
    }

    /// Select `address` for `panel`; an empty address clears the binding.
    pub async fn set_binding(
        &self,
        panel: InstrumentType,
        address: &str,
    ) -> AppResult<BindingChange> {
        self.request(ControllerCommand::set_binding(panel, address))
            .await
    }

    /// [`set_binding`](Self::set_binding) with the panel given by name
    /// (`power-supply`, `eload`, `daq`, `scope`).
    pub async fn set_binding_named(&self, panel: &str, address: &str) -> AppResult<BindingChange> {
        let panel: InstrumentType = panel.parse()?;
        self.set_binding(panel, address).await
    }

    /// Selected address of `panel`.
    pub async fn get_binding(&self, panel: InstrumentType) -> AppResult<Option<String>> {
        self.request(ControllerCommand::get_binding(panel)).await
    }

    /// Run `action` on `panel` and wait for its outcome.
    pub async fn dispatch(
        &self,
        panel: InstrumentType,
        action: &str,
    ) -> Result<ControlResult, DispatchError> {
        match self.request(ControllerCommand::dispatch(panel, action)).await {
            Ok(result) => result,
            Err(e) => Err(DispatchError::Transport(e.to_string())),
        }
    }

    /// Refresh the client session identity now.
    pub async fn refresh_session(&self) -> AppResult<ClientSessionInfo> {
        self.request(ControllerCommand::refresh_session()).await
    }

    /// Copy of the full presentation state.
    pub async fn snapshot(&self) -> AppResult<ControllerSnapshot> {
        self.request(ControllerCommand::snapshot()).await
    }

    /// Receive every [`UiEvent`] published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// Stop the controller, cancelling polling and in-flight dispatches.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(ControllerCommand::shutdown()).await
    }
}

/// The session and dispatch engine. See the [module docs](self).
pub struct Controller {
    config: ControllerConfig,
    backend: Arc<dyn Backend>,
    forms: Arc<dyn FormSource>,
    registry: InstrumentRegistry,
    bindings: PanelBindingTable,
    polling: PollingManager,
    tracker: SessionTracker,
    panels: BTreeMap<InstrumentType, PanelState>,
    global_notice: Option<Notice>,
    detect_response: Option<oneshot::Sender<Result<Vec<Instrument>, DetectError>>>,
    session_waiters: Vec<oneshot::Sender<ClientSessionInfo>>,
    queued_session_waiters: Vec<oneshot::Sender<ClientSessionInfo>>,
    session_in_flight: bool,
    session_queued: bool,
    next_notice_id: u64,
    next_dispatch_id: u64,
    events: broadcast::Sender<UiEvent>,
    internal: mpsc::UnboundedSender<ControllerEvent>,
}

impl Controller {
    /// Create the controller and its handle, and spawn it on the current runtime.
    pub fn spawn(
        config: ControllerConfig,
        backend: Arc<dyn Backend>,
        forms: Arc<dyn FormSource>,
    ) -> ControllerHandle {
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_capacity.max(1));
        let (events, _) = broadcast::channel(config.channels.event_capacity.max(1));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let controller = Self::new(config, backend, forms, events.clone(), internal_tx);
        tokio::spawn(controller.run(command_rx, internal_rx));

        ControllerHandle {
            commands: command_tx,
            events,
        }
    }

    fn new(
        config: ControllerConfig,
        backend: Arc<dyn Backend>,
        forms: Arc<dyn FormSource>,
        events: broadcast::Sender<UiEvent>,
        internal: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Self {
        let polling = PollingManager::new(config.timing.polling_interval);
        let panels = InstrumentType::ALL
            .into_iter()
            .map(|ty| (ty, PanelState::default()))
            .collect();
        Self {
            config,
            backend,
            forms,
            registry: InstrumentRegistry::new(),
            bindings: PanelBindingTable::new(),
            polling,
            tracker: SessionTracker::new(),
            panels,
            global_notice: None,
            detect_response: None,
            session_waiters: Vec::new(),
            queued_session_waiters: Vec::new(),
            session_in_flight: false,
            session_queued: false,
            next_notice_id: 0,
            next_dispatch_id: 0,
            events,
            internal,
        }
    }

    /// Event loop. Exits on `Shutdown` or when every handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControllerCommand>,
        mut internal: mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        info!(application = %self.config.application.name, "Controller started");
        self.show_notice(NoticeScope::Global, Severity::Info, WELCOME_TEXT.to_string());

        // first tick fires immediately
        let mut session_ticker = interval(self.config.timing.session_refresh_interval);
        session_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = internal.recv() => self.handle_event(event),
                _ = session_ticker.tick() => self.request_session_refresh(None),
            }
        }

        info!("Controller stopped");
    }

    fn handle_command(&mut self, command: ControllerCommand) -> ControlFlow<()> {
        match command {
            ControllerCommand::Detect { response } => self.detect(response),
            ControllerCommand::SetBinding {
                panel,
                address,
                response,
            } => {
                let change = self.apply_binding(panel, &address);
                let _ = response.send(change);
            }
            ControllerCommand::GetBinding { panel, response } => {
                let _ = response.send(self.bindings.get(panel).map(str::to_string));
            }
            ControllerCommand::Dispatch {
                panel,
                action,
                response,
            } => self.dispatch(panel, action, response),
            ControllerCommand::RefreshSession { response } => {
                self.request_session_refresh(Some(response));
            }
            ControllerCommand::Snapshot { response } => {
                let _ = response.send(self.snapshot());
            }
            ControllerCommand::Shutdown { response } => {
                self.shutdown();
                let _ = response.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::DetectFinished { outcome } => self.finish_detection(outcome),
            ControllerEvent::DispatchFinished {
                panel,
                dispatch_id,
                request,
                outcome,
            } => self.finish_dispatch(panel, dispatch_id, request, outcome),
            ControllerEvent::SettleElapsed { panel, dispatch_id } => {
                self.finish_settle(panel, dispatch_id);
            }
            ControllerEvent::PollResult {
                panel,
                session_id,
                outcome,
            } => self.apply_poll_result(panel, session_id, outcome),
            ControllerEvent::SessionRefreshed { outcome } => self.finish_session_refresh(outcome),
            ControllerEvent::NoticeExpired { scope, id } => self.expire_notice(scope, id),
        }
    }

    fn emit(&self, event: UiEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn panel_mut(&mut self, panel: InstrumentType) -> &mut PanelState {
        self.panels.entry(panel).or_default()
    }

    // --- notices ---

    fn show_notice(&mut self, scope: NoticeScope, severity: Severity, message: String) -> u64 {
        self.next_notice_id += 1;
        let id = self.next_notice_id;
        let delay = self.config.timing.notice_clear_delay;
        let expires_at = severity.auto_clears().then(|| Instant::now() + delay);

        let notice = Notice {
            id,
            scope,
            severity,
            message,
            issued_at: Utc::now(),
            expires_at,
        };
        match scope {
            NoticeScope::Global => self.global_notice = Some(notice.clone()),
            NoticeScope::Panel(panel) => self.panel_mut(panel).notice = Some(notice.clone()),
        }
        self.emit(UiEvent::NoticeShown(notice));

        if expires_at.is_some() {
            let internal = self.internal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = internal.send(ControllerEvent::NoticeExpired { scope, id });
            });
        }
        id
    }

    fn expire_notice(&mut self, scope: NoticeScope, id: u64) {
        let slot = match scope {
            NoticeScope::Global => &mut self.global_notice,
            NoticeScope::Panel(panel) => &mut self.panel_mut(panel).notice,
        };
        // a newer notice replaced this one; leave it
        if slot.as_ref().is_some_and(|n| n.id == id) {
            *slot = None;
            self.emit(UiEvent::NoticeCleared { scope, id });
        }
    }

    // --- detection ---

    fn detect(&mut self, response: oneshot::Sender<Result<Vec<Instrument>, DetectError>>) {
        if !self.registry.begin_detection() {
            debug!("Detection already in flight; ignoring request");
            let _ = response.send(Err(DetectError::AlreadyInFlight));
            return;
        }
        self.detect_response = Some(response);

        info!("Scanning for instruments");
        self.emit(UiEvent::DetectControl { enabled: false });
        self.show_notice(NoticeScope::Global, Severity::Info, SCANNING_TEXT.to_string());

        let backend = self.backend.clone();
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let outcome = backend.scan_instruments().await;
            let _ = internal.send(ControllerEvent::DetectFinished { outcome });
        });
    }

    fn finish_detection(&mut self, outcome: Result<ScanResponse, BackendError>) {
        let result = match outcome {
            Ok(scan) if scan.success => {
                let count = scan.instruments.len();
                info!(count, "Detection complete");
                self.registry.complete_detection(scan.instruments);
                self.reset_panels();
                self.emit(UiEvent::InstrumentsChanged {
                    instruments: self.registry.instruments().to_vec(),
                });
                self.show_notice(
                    NoticeScope::Global,
                    Severity::Success,
                    format!("Detected {count} instrument(s)"),
                );
                self.request_session_refresh(None);
                Ok(self.registry.instruments().to_vec())
            }
            Ok(scan) => {
                self.registry.abort_detection();
                let err = DetectError::ServerRejected { detail: scan.detail };
                warn!(error = %err, "Detection rejected by backend");
                self.show_notice(NoticeScope::Global, Severity::Error, err.to_string());
                Err(err)
            }
            Err(e) => {
                self.registry.abort_detection();
                warn!(error = %e, "Detection failed");
                self.show_notice(
                    NoticeScope::Global,
                    Severity::Error,
                    DETECT_NETWORK_ERROR_TEXT.to_string(),
                );
                Err(DetectError::Transport(e.to_string()))
            }
        };

        self.emit(UiEvent::DetectControl { enabled: true });
        if let Some(response) = self.detect_response.take() {
            let _ = response.send(result);
        }
    }

    /// New detection results re-render every panel: bindings are cleared and
    /// result displays reset.
    fn reset_panels(&mut self) {
        let bound: Vec<InstrumentType> = self.bindings.bound_panels().map(|(ty, _)| ty).collect();
        for panel in bound {
            self.apply_binding(panel, "");
        }
        for state in self.panels.values_mut() {
            state.daq = None;
            state.waveform = None;
            state.status = StatusDisplay::default();
        }
    }

    // --- bindings ---

    fn apply_binding(&mut self, panel: InstrumentType, address: &str) -> BindingChange {
        let trimmed = address.trim();
        if !trimmed.is_empty() && !self.registry.contains_address(trimmed) {
            warn!(%panel, address = trimmed, "Binding to an address that was not detected");
        }

        let change = self.bindings.set(panel, address);
        match &change {
            BindingChange::Cleared { previous } => {
                self.cancel_dispatch(panel, CANCELLED_REBOUND);
                if self.polling.stop(panel) {
                    self.emit(UiEvent::Polling {
                        panel,
                        address: None,
                    });
                }
                if previous.is_some() {
                    info!(%panel, "Binding cleared");
                }
                self.emit(UiEvent::BindingChanged {
                    panel,
                    address: None,
                });
                self.emit(UiEvent::ControlsEnabled {
                    panel,
                    enabled: false,
                });
            }
            BindingChange::Bound { address, .. } => {
                if change.address_changed() {
                    self.cancel_dispatch(panel, CANCELLED_REBOUND);
                }
                // same-address rebind keeps a running dispatch; controls stay off until it settles
                let busy = self.panel_mut(panel).activity != PanelActivity::Idle;
                let enabled = self.bindings.set_controls_enabled(panel, !busy);
                info!(%panel, address = %address, "Panel bound");
                self.emit(UiEvent::BindingChanged {
                    panel,
                    address: Some(address.clone()),
                });
                self.emit(UiEvent::ControlsEnabled { panel, enabled });

                if self.config.polling.enabled {
                    self.polling.start(
                        panel,
                        address,
                        self.backend.clone(),
                        self.internal.clone(),
                    );
                    self.emit(UiEvent::Polling {
                        panel,
                        address: Some(address.clone()),
                    });
                }
            }
        }
        change
    }

    // --- dispatch ---

    fn dispatch(
        &mut self,
        panel: InstrumentType,
        action: String,
        response: oneshot::Sender<Result<ControlResult, DispatchError>>,
    ) {
        let Some(address) = self.bindings.get(panel).map(str::to_string) else {
            self.show_notice(
                NoticeScope::Panel(panel),
                Severity::Error,
                SELECT_ADDRESS_TEXT.to_string(),
            );
            let _ = response.send(Err(LocalValidationError::NoAddressSelected(panel).into()));
            return;
        };

        if !self.bindings.controls_enabled(panel)
            || self.panel_mut(panel).activity != PanelActivity::Idle
        {
            debug!(%panel, %action, "Controls disabled; dispatch refused");
            let _ = response.send(Err(LocalValidationError::ControlsDisabled(panel).into()));
            return;
        }

        let form = self.forms.snapshot(panel);
        let request = match dispatch::build_request(panel, &address, &action, &form) {
            Ok(request) => request,
            Err(e) => {
                self.show_notice(NoticeScope::Panel(panel), Severity::Error, e.to_string());
                let _ = response.send(Err(e.into()));
                return;
            }
        };

        self.next_dispatch_id += 1;
        let dispatch_id = self.next_dispatch_id;
        info!(%panel, %address, %action, dispatch_id, "Dispatching command");

        self.bindings.set_controls_enabled(panel, false);
        self.emit(UiEvent::ControlsEnabled {
            panel,
            enabled: false,
        });
        self.show_notice(
            NoticeScope::Panel(panel),
            Severity::Info,
            format!("Executing {action}..."),
        );

        let backend = self.backend.clone();
        let internal = self.internal.clone();
        let handle = tokio::spawn(async move {
            let outcome = backend.execute_command(&request).await;
            let _ = internal.send(ControllerEvent::DispatchFinished {
                panel,
                dispatch_id,
                request,
                outcome,
            });
        });

        let state = self.panel_mut(panel);
        state.activity = PanelActivity::InFlight {
            dispatch_id,
            address,
            action,
        };
        state.pending = Some(PendingDispatch {
            dispatch_id,
            handle,
            response,
        });
    }

    /// Abort the in-flight dispatch of `panel` and forget any settle timer.
    fn cancel_dispatch(&mut self, panel: InstrumentType, reason: &str) {
        let state = self.panel_mut(panel);
        state.activity = PanelActivity::Idle;
        if let Some(pending) = state.pending.take() {
            pending.handle.abort();
            debug!(%panel, dispatch_id = pending.dispatch_id, reason, "Dispatch cancelled");
            let _ = pending
                .response
                .send(Err(DispatchError::Transport(reason.to_string())));
        }
    }

    fn finish_dispatch(
        &mut self,
        panel: InstrumentType,
        dispatch_id: u64,
        request: ControlRequest,
        outcome: Result<ControlResult, BackendError>,
    ) {
        let current = matches!(
            &self.panel_mut(panel).activity,
            PanelActivity::InFlight { dispatch_id: id, .. } if *id == dispatch_id
        );
        if !current || self.bindings.get(panel) != Some(request.address.as_str()) {
            debug!(%panel, dispatch_id, "Discarding stale dispatch completion");
            return;
        }
        let pending = self.panel_mut(panel).pending.take();

        let result = dispatch::classify(outcome);
        match &result {
            Ok(reply) => {
                match dispatch::route_for(panel, &request.action) {
                    ResultRoute::DaqResults => {
                        let requested: &[ChannelRead] = match &request.value {
                            Some(ControlValue::Channels(channels)) => channels.as_slice(),
                            _ => &[],
                        };
                        let readout = DaqReadout::render(requested, reply.results.as_ref());
                        self.panel_mut(panel).daq = Some(readout.clone());
                        self.emit(UiEvent::DaqResults(readout));
                    }
                    ResultRoute::Waveform => {
                        let waveform = WaveformView::from_data(reply.data.clone());
                        if waveform == WaveformView::Invalid {
                            warn!(%panel, "Waveform reply is missing an axis");
                        }
                        self.panel_mut(panel).waveform = Some(waveform.clone());
                        self.emit(UiEvent::Waveform { panel, waveform });
                    }
                    ResultRoute::NoticeOnly => {}
                }
                info!(%panel, action = %request.action, dispatch_id, "Command succeeded");
                self.show_notice(
                    NoticeScope::Panel(panel),
                    Severity::Success,
                    OPERATION_SUCCEEDED_TEXT.to_string(),
                );
            }
            Err(err) => {
                warn!(%panel, action = %request.action, dispatch_id, error = %err, "Command failed");
                let message = match err {
                    DispatchError::ServerRejected {
                        detail: Some(detail),
                    } => format!("Operation failed: {detail}"),
                    _ => OPERATION_NETWORK_ERROR_TEXT.to_string(),
                };
                self.show_notice(NoticeScope::Panel(panel), Severity::Error, message);
            }
        }

        self.panel_mut(panel).activity = PanelActivity::Settling { dispatch_id };
        let settle = self.config.timing.settle_delay;
        let internal = self.internal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let _ = internal.send(ControllerEvent::SettleElapsed { panel, dispatch_id });
        });

        if let Some(pending) = pending {
            let _ = pending.response.send(result);
        }
    }

    fn finish_settle(&mut self, panel: InstrumentType, dispatch_id: u64) {
        if self.panel_mut(panel).activity != (PanelActivity::Settling { dispatch_id }) {
            return;
        }
        self.panel_mut(panel).activity = PanelActivity::Idle;
        // an unbound panel keeps its controls disabled
        if self.bindings.get(panel).is_some() {
            let enabled = self.bindings.set_controls_enabled(panel, true);
            self.emit(UiEvent::ControlsEnabled { panel, enabled });
        }
    }

    // --- polling ---

    fn apply_poll_result(
        &mut self,
        panel: InstrumentType,
        session_id: u64,
        outcome: Result<StatusFields, BackendError>,
    ) {
        if !self.polling.is_current(panel, session_id) {
            debug!(%panel, session_id, "Discarding stale poll result");
            return;
        }
        match outcome {
            Ok(fields) => {
                let display = StatusDisplay::render(panel, &fields);
                self.panel_mut(panel).status = display.clone();
                self.emit(UiEvent::Status { panel, display });
            }
            Err(e) => {
                match e {
                    BackendError::Status(code) => {
                        debug!(%panel, session_id, code, "Status poll answered non-ok; polling stopped");
                    }
                    other => {
                        warn!(%panel, session_id, error = %other, "Status poll failed; polling stopped");
                    }
                }
                self.polling.finish(panel, session_id);
                self.emit(UiEvent::Polling {
                    panel,
                    address: None,
                });
            }
        }
    }

    // --- session identity ---

    /// Start an identity fetch. A request arriving while one is in flight is
    /// queued behind it, so every caller sees a fetch that started after it asked.
    fn request_session_refresh(&mut self, waiter: Option<oneshot::Sender<ClientSessionInfo>>) {
        if self.session_in_flight {
            self.session_queued = true;
            self.queued_session_waiters.extend(waiter);
            return;
        }
        self.session_waiters.extend(waiter);
        self.session_in_flight = true;
        let backend = self.backend.clone();
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let outcome = backend.client_identity().await;
            let _ = internal.send(ControllerEvent::SessionRefreshed { outcome });
        });
    }

    fn finish_session_refresh(
        &mut self,
        outcome: Result<ClientIdentity, BackendError>,
    ) {
        self.session_in_flight = false;
        let info = match outcome {
            Ok(identity) => self.tracker.record_identity(identity).clone(),
            Err(e) => self.tracker.record_failure(&e.to_string()).clone(),
        };
        debug!(
            session_id = %info.session_id,
            connectivity = info.connectivity.label(),
            "Session identity refreshed"
        );
        self.emit(UiEvent::Session(info.clone()));
        for waiter in self.session_waiters.drain(..) {
            let _ = waiter.send(info.clone());
        }

        if std::mem::take(&mut self.session_queued) {
            let queued = std::mem::take(&mut self.queued_session_waiters);
            self.session_waiters = queued;
            self.request_session_refresh(None);
        }
    }

    // --- lifecycle ---

    fn snapshot(&self) -> ControllerSnapshot {
        let options = self.registry.selectable_addresses();
        let panels = InstrumentType::ALL
            .into_iter()
            .map(|panel| {
                let state = self.panels.get(&panel);
                let view = PanelView {
                    binding: self.bindings.binding(panel),
                    activity: state.map(|s| s.activity.clone()).unwrap_or_default(),
                    options: options.clone(),
                    notice: state.and_then(|s| s.notice.clone()),
                    daq: state.and_then(|s| s.daq.clone()),
                    waveform: state.and_then(|s| s.waveform.clone()),
                    status: state.map(|s| s.status.clone()).unwrap_or_default(),
                    polling: self.polling.info(panel),
                };
                (panel, view)
            })
            .collect();

        ControllerSnapshot {
            instruments: self.registry.instruments().to_vec(),
            detecting: self.registry.is_detecting(),
            detection_generation: self.registry.generation(),
            panels,
            global_notice: self.global_notice.clone(),
            session: self.tracker.info().clone(),
        }
    }

    fn shutdown(&mut self) {
        info!("Controller shutting down");
        self.polling.stop_all();
        for panel in InstrumentType::ALL {
            self.cancel_dispatch(panel, CANCELLED_SHUTDOWN);
        }
    }
}
