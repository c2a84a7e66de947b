//! Panel binding behaviour: control enablement, polling ownership and
//! rebinding while a dispatch is running.

mod common;

use ate_control::backend::SimulatedBackend;
use ate_control::binding::BindingChange;
use ate_control::controller::OPERATION_SUCCEEDED_TEXT;
use ate_control::dispatch::PanelActivity;
use ate_control::error::{ControlError, DispatchError};
use ate_control::form::StaticForms;
use ate_control::instrument::InstrumentType;
use ate_control::view::UiEvent;
use common::{detected, drain, settle_tasks, ELOAD, PSU};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_panels_start_unbound_and_disabled() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;

    let snapshot = handle.snapshot().await.unwrap();
    for panel in InstrumentType::ALL {
        let view = snapshot.panel(panel).unwrap();
        assert_eq!(view.binding.selected_address, None);
        assert!(!view.binding.controls_enabled);
        assert!(view.polling.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_binding_enables_controls_and_starts_one_poller() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    let mut events = handle.subscribe();

    let change = handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();
    assert_eq!(
        change,
        BindingChange::Bound {
            previous: None,
            address: PSU.to_string()
        }
    );
    assert_eq!(
        handle.get_binding(InstrumentType::PowerSupply).await.unwrap(),
        Some(PSU.to_string())
    );

    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::PowerSupply).unwrap();
    assert!(view.binding.controls_enabled);
    assert_eq!(view.polling.as_ref().map(|p| p.address.as_str()), Some(PSU));
    assert_eq!(snapshot.polling_count(), 1);

    let events = drain(&mut events);
    assert!(events.contains(&UiEvent::ControlsEnabled {
        panel: InstrumentType::PowerSupply,
        enabled: true
    }));
    assert!(events.contains(&UiEvent::Polling {
        panel: InstrumentType::PowerSupply,
        address: Some(PSU.to_string())
    }));
}

#[tokio::test(start_paused = true)]
async fn test_clearing_binding_disables_and_stops_polling() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;

    handle.set_binding(InstrumentType::Eload, ELOAD).await.unwrap();
    let change = handle.set_binding(InstrumentType::Eload, "").await.unwrap();
    assert_eq!(
        change,
        BindingChange::Cleared {
            previous: Some(ELOAD.to_string())
        }
    );

    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::Eload).unwrap();
    assert!(!view.binding.controls_enabled);
    assert!(view.polling.is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(backend.status_requests().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rebinding_leaves_single_timer_on_new_address() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;

    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    handle
        .set_binding(InstrumentType::PowerSupply, ELOAD)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(4_500)).await;

    let polled: Vec<String> = backend
        .status_requests()
        .await
        .into_iter()
        .map(|(_, address)| address)
        .collect();
    assert_eq!(polled, vec![PSU, ELOAD, ELOAD]);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.polling_count(), 1);
    assert_eq!(
        snapshot
            .panel(InstrumentType::PowerSupply)
            .unwrap()
            .polling
            .as_ref()
            .map(|p| p.address.as_str()),
        Some(ELOAD)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_panel_name_rejected() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;

    let err = handle.set_binding_named("laser", PSU).await.unwrap_err();
    assert!(matches!(err, ControlError::UnknownInstrumentType(name) if name == "laser"));

    let change = handle.set_binding_named("eload", ELOAD).await.unwrap();
    assert!(!change.had_binding());
}

#[tokio::test(start_paused = true)]
async fn test_undetected_address_still_binds() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;

    handle
        .set_binding(InstrumentType::Daq, "GPIB0::30::INSTR")
        .await
        .unwrap();
    assert_eq!(
        handle.get_binding(InstrumentType::Daq).await.unwrap().as_deref(),
        Some("GPIB0::30::INSTR")
    );
}

#[tokio::test(start_paused = true)]
async fn test_same_address_rebind_keeps_dispatch_running() {
    let backend = SimulatedBackend::new().with_latency(Duration::from_millis(500));
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();

    let h = handle.clone();
    let dispatch = tokio::spawn(async move { h.dispatch(InstrumentType::PowerSupply, "on").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let change = handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();
    assert!(!change.address_changed());

    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::PowerSupply).unwrap();
    assert!(view.activity.is_in_flight());
    assert!(!view.binding.controls_enabled);

    let result = dispatch.await.unwrap().unwrap();
    assert!(result.success);

    // settle delay runs from completion
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot
        .panel(InstrumentType::PowerSupply)
        .unwrap()
        .binding
        .controls_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_rebinding_cancels_in_flight_dispatch() {
    let backend = SimulatedBackend::new().with_latency(Duration::from_millis(500));
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle
        .set_binding(InstrumentType::PowerSupply, PSU)
        .await
        .unwrap();

    let h = handle.clone();
    let dispatch = tokio::spawn(async move { h.dispatch(InstrumentType::PowerSupply, "on").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle
        .set_binding(InstrumentType::PowerSupply, ELOAD)
        .await
        .unwrap();

    let err = dispatch.await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Transport(ref reason) if reason.contains("cancelled")));

    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::PowerSupply).unwrap();
    assert_eq!(view.activity, PanelActivity::Idle);
    assert!(view.binding.controls_enabled);
    assert_eq!(backend.requests().await.len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let snapshot = handle.snapshot().await.unwrap();
    let notice = snapshot
        .panel(InstrumentType::PowerSupply)
        .unwrap()
        .notice
        .clone();
    assert!(notice.map_or(true, |n| n.message != OPERATION_SUCCEEDED_TEXT));
}

#[tokio::test(start_paused = true)]
async fn test_unbinding_during_settle_keeps_controls_disabled() {
    let backend = SimulatedBackend::new();
    let forms = Arc::new(StaticForms::new());
    let handle = detected(&backend, &forms).await;
    handle.set_binding(InstrumentType::Scope, common::SCOPE).await.unwrap();

    handle
        .dispatch(InstrumentType::Scope, "autoset")
        .await
        .unwrap();
    handle.set_binding(InstrumentType::Scope, "").await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle_tasks().await;
    let snapshot = handle.snapshot().await.unwrap();
    let view = snapshot.panel(InstrumentType::Scope).unwrap();
    assert!(!view.binding.controls_enabled);
    assert_eq!(view.activity, PanelActivity::Idle);
}
