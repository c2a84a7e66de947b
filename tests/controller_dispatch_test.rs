//! Command dispatch through the controller: request assembly, result routing,
//! notices and the settle delay.

mod common;

use ate_control::backend::SimulatedBackend;
use ate_control::controller::{
    OPERATION_NETWORK_ERROR_TEXT, OPERATION_SUCCEEDED_TEXT, SELECT_ADDRESS_TEXT,
};
use ate_control::dispatch::PanelActivity;
use ate_control::error::{DispatchError, LocalValidationError};
use ate_control::form::{
    FormValues, StaticForms, INPUT_ELOAD_CURRENT, INPUT_PSU_CURRENT, INPUT_PSU_VOLTAGE,
};
use ate_control::instrument::InstrumentType;
use ate_control::protocol::{ChannelRead, ControlValue};
use ate_control::view::{ChannelReadout, Severity, UiEvent, WaveformView};
use common::{detected, drain, DAQ, ELOAD, PSU, SCOPE};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_unbound_dispatch_is_local_error_without_network() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;

    let err = handle
        .dispatch(InstrumentType::PowerSupply, "on")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::LocalValidation(LocalValidationError::NoAddressSelected(
            InstrumentType::PowerSupply
        ))
    );
    assert!(backend.requests().await.is_empty());

    let snapshot = handle.snapshot().await.unwrap();
    let notice = snapshot
        .panel(InstrumentType::PowerSupply)
        .unwrap()
        .notice
        .clone()
        .unwrap();
    assert_eq!(notice.message, SELECT_ADDRESS_TEXT);
    assert_eq!(notice.severity, Severity::Error);
}

#[tokio::test(start_paused = true)]
async fn test_daq_read_sends_non_empty_channels_in_order() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    forms.set(
        InstrumentType::Daq,
        FormValues::new()
            .with_channel_row("102", "VOLT")
            .with_channel_row("", "RES")
            .with_channel_row("103", "TEMP"),
    );
    let handle = detected(&backend, &forms).await;
    handle.set_binding(InstrumentType::Daq, DAQ).await.unwrap();

    let result = handle.dispatch(InstrumentType::Daq, "read").await.unwrap();
    assert!(result.success);

    let requests = backend.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].value,
        Some(ControlValue::Channels(vec![
            ChannelRead::new("102", "VOLT"),
            ChannelRead::new("103", "TEMP"),
        ]))
    );

    let snapshot = handle.snapshot().await.unwrap();
    let readout = snapshot
        .panel(InstrumentType::Daq)
        .unwrap()
        .daq
        .clone()
        .unwrap();
    assert_eq!(readout.channels.len(), 2);
    assert!(matches!(
        readout.get("102").unwrap(),
        ChannelReadout::Value { symbol, .. } if symbol == "V"
    ));
    assert!(matches!(
        readout.get("103").unwrap(),
        ChannelReadout::Value { symbol, .. } if symbol == "°C"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_scalar_inputs_are_scoped_to_panel() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    forms.set(
        InstrumentType::PowerSupply,
        FormValues::new()
            .with_input(INPUT_PSU_VOLTAGE, "12")
            .with_input(INPUT_PSU_CURRENT, "1.5"),
    );
    forms.set(
        InstrumentType::Eload,
        FormValues::new().with_input(INPUT_ELOAD_CURRENT, "0.75"),
    );
    let handle = detected(&backend, &forms).await;
    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();
    handle.set_binding(InstrumentType::Eload, ELOAD).await.unwrap();

    handle
        .dispatch(InstrumentType::PowerSupply, "set_voltage")
        .await
        .unwrap();
    handle
        .dispatch(InstrumentType::Eload, "set_current")
        .await
        .unwrap();

    let values: Vec<Option<ControlValue>> = backend
        .requests()
        .await
        .into_iter()
        .map(|r| r.value)
        .collect();
    assert_eq!(
        values,
        vec![
            Some(ControlValue::Scalar("12".into())),
            Some(ControlValue::Scalar("0.75".into())),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_form_input_never_reaches_backend() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle.set_binding(InstrumentType::Scope, SCOPE).await.unwrap();

    let err = handle
        .dispatch(InstrumentType::Scope, "set_trigger")
        .await
        .unwrap_err();
    assert!(err.is_local());
    assert!(backend.requests().await.is_empty());

    // controls were never disabled
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot
        .panel(InstrumentType::Scope)
        .unwrap()
        .binding
        .controls_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_shows_detail_and_keeps_results() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    forms.set(
        InstrumentType::Daq,
        FormValues::new().with_channel_row("101", "VOLT"),
    );
    let handle = detected(&backend, &forms).await;
    handle.set_binding(InstrumentType::Daq, DAQ).await.unwrap();

    handle.dispatch(InstrumentType::Daq, "read").await.unwrap();
    let before = handle.snapshot().await.unwrap();
    let readout_before = before.panel(InstrumentType::Daq).unwrap().daq.clone();

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    backend.reject_commands(Some("timeout")).await;
    let err = handle.dispatch(InstrumentType::Daq, "read").await.unwrap_err();
    assert_eq!(
        err,
        DispatchError::ServerRejected {
            detail: Some("timeout".into())
        }
    );

    let after = handle.snapshot().await.unwrap();
    let view = after.panel(InstrumentType::Daq).unwrap();
    let notice = view.notice.clone().unwrap();
    assert_eq!(notice.severity, Severity::Error);
    assert!(notice.message.contains("timeout"));
    assert_eq!(view.daq, readout_before);
    assert_eq!(view.waveform, None);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_shows_network_error() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle.set_binding(InstrumentType::Eload, ELOAD).await.unwrap();

    backend.set_offline(true);
    let err = handle.dispatch(InstrumentType::Eload, "on").await.unwrap_err();
    assert!(matches!(err, DispatchError::Transport(_)));

    let snapshot = handle.snapshot().await.unwrap();
    let notice = snapshot
        .panel(InstrumentType::Eload)
        .unwrap()
        .notice
        .clone()
        .unwrap();
    assert_eq!(notice.message, OPERATION_NETWORK_ERROR_TEXT);
}

#[tokio::test(start_paused = true)]
async fn test_controls_disabled_while_in_flight_and_during_settle() {
    let backend = SimulatedBackend::new().with_latency(Duration::from_millis(500));
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();

    let h = handle.clone();
    let first = tokio::spawn(async move { h.dispatch(InstrumentType::PowerSupply, "on").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::PowerSupply).unwrap();
    assert!(view.activity.is_in_flight());
    assert!(!view.binding.controls_enabled);

    // a second click while disabled never reaches the backend
    let err = handle
        .dispatch(InstrumentType::PowerSupply, "off")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::LocalValidation(LocalValidationError::ControlsDisabled(
            InstrumentType::PowerSupply
        ))
    );

    first.await.unwrap().unwrap();
    assert_eq!(backend.requests().await.len(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::PowerSupply).unwrap();
    assert!(matches!(view.activity, PanelActivity::Settling { .. }));
    assert!(!view.binding.controls_enabled);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::PowerSupply).unwrap();
    assert_eq!(view.activity, PanelActivity::Idle);
    assert!(view.binding.controls_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_panels_dispatch_independently() {
    let backend = SimulatedBackend::new().with_latency(Duration::from_millis(500));
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();
    handle.set_binding(InstrumentType::Scope, SCOPE).await.unwrap();

    let h = handle.clone();
    let psu = tokio::spawn(async move { h.dispatch(InstrumentType::PowerSupply, "on").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let scope = handle.dispatch(InstrumentType::Scope, "autoset").await;
    assert!(scope.is_ok());
    assert!(psu.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_waveform_routed_to_panel() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle.set_binding(InstrumentType::Scope, SCOPE).await.unwrap();
    let mut events = handle.subscribe();

    handle
        .dispatch(InstrumentType::Scope, "get_waveform")
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::Scope).unwrap();
    match &view.waveform {
        Some(WaveformView::Series { x, y }) => {
            assert!(!x.is_empty());
            assert_eq!(x.len(), y.len());
        }
        other => panic!("expected a waveform series, got {other:?}"),
    }
    assert_eq!(view.notice.as_ref().unwrap().message, OPERATION_SUCCEEDED_TEXT);

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::Waveform { panel: InstrumentType::Scope, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_success_notice_auto_clears_but_errors_stay() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();
    handle.set_binding(InstrumentType::Eload, ELOAD).await.unwrap();

    handle
        .dispatch(InstrumentType::PowerSupply, "on")
        .await
        .unwrap();
    backend.reject_commands(Some("overcurrent")).await;
    handle
        .dispatch(InstrumentType::Eload, "on")
        .await
        .unwrap_err();

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot
        .panel(InstrumentType::PowerSupply)
        .unwrap()
        .notice
        .is_none());
    let eload_notice = snapshot
        .panel(InstrumentType::Eload)
        .unwrap()
        .notice
        .clone()
        .unwrap();
    assert_eq!(eload_notice.message, "Operation failed: overcurrent");
}
