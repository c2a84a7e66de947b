//! Shared fixtures for controller integration tests.
#![allow(dead_code)]

use ate_control::backend::SimulatedBackend;
use ate_control::config::ControllerConfig;
use ate_control::controller::{Controller, ControllerHandle};
use ate_control::form::StaticForms;
use ate_control::view::UiEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const PSU: &str = "GPIB0::5::INSTR";
pub const ELOAD: &str = "GPIB0::7::INSTR";
pub const DAQ: &str = "GPIB0::9::INSTR";
pub const SCOPE: &str = "TCPIP0::192.168.0.50::INSTR";

/// Controller over `backend` with default timings
/// (settle 1s, polling 2s, session refresh 15s, notices 5s).
pub fn spawn(backend: &SimulatedBackend, forms: &Arc<StaticForms>) -> ControllerHandle {
    spawn_with(ControllerConfig::default(), backend, forms)
}

pub fn spawn_with(
    config: ControllerConfig,
    backend: &SimulatedBackend,
    forms: &Arc<StaticForms>,
) -> ControllerHandle {
    Controller::spawn(config, Arc::new(backend.clone()), forms.clone())
}

/// Controller over the default bench with detection already done.
pub async fn detected(backend: &SimulatedBackend, forms: &Arc<StaticForms>) -> ControllerHandle {
    let handle = spawn(backend, forms);
    handle.detect().await.expect("detection on the default bench");
    handle
}

/// Let spawned tasks run without moving the paused clock far.
pub async fn settle_tasks() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
