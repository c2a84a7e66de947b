//! Simulated Backend
//!
//! An in-process stand-in for the measurement backend and the client agent
//! behind it, for running the controller without a bench and for testing.
//! All waits use `tokio::time::sleep` so paused-clock tests stay deterministic.
//!
//! # Default Bench
//!
//! | Address                          | Instrument              |
//! |----------------------------------|-------------------------|
//! | `GPIB0::5::INSTR`                | Chroma 62012P-80-60 PSU |
//! | `GPIB0::7::INSTR`                | Chroma 63206A eload     |
//! | `GPIB0::9::INSTR`                | HP 34970A DAQ           |
//! | `TCPIP0::192.168.0.50::INSTR`    | Tektronix MSO54B scope  |
//!
//! # Command Rules
//!
//! - `daq`: only `read`, with a non-empty channel list
//! - `power-supply` / `eload`: `on`, `off`, `set_voltage`, `set_current`
//! - `scope`: `get_waveform`, `set_trigger`, `autoset`
//! - anything else is rejected with a `detail`

use crate::backend::{Backend, BackendError};
use crate::instrument::{Instrument, InstrumentType};
use crate::protocol::{
    ChannelReading, ClientIdentity, ControlRequest, ControlResult, ControlValue, ScanResponse,
    StatusFields, WaveformData,
};
use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

/// Number of samples in a simulated waveform.
const WAVEFORM_SAMPLES: usize = 500;

#[derive(Debug, Clone, Default)]
struct OutputState {
    enabled: bool,
    voltage: f64,
    current: f64,
    trigger_level: f64,
}

/// Simulated measurement backend.
///
/// Cheap to clone; clones share state, so a test can keep one handle while the
/// controller owns another.
#[derive(Clone)]
pub struct SimulatedBackend {
    bench: Arc<RwLock<Vec<Instrument>>>,
    last_scan: Arc<RwLock<Vec<Instrument>>>,
    outputs: Arc<RwLock<HashMap<String, OutputState>>>,
    requests: Arc<RwLock<Vec<ControlRequest>>>,
    status_requests: Arc<RwLock<Vec<(InstrumentType, String)>>>,
    rejection: Arc<RwLock<Option<String>>>,
    scan_failure: Arc<RwLock<Option<String>>>,
    latency_ms: Arc<AtomicU64>,
    status_endpoint: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
    scan_calls: Arc<AtomicU64>,
    identity_calls: Arc<AtomicU64>,
    session_id: String,
}

impl SimulatedBackend {
    /// Backend serving the default four-instrument bench.
    pub fn new() -> Self {
        Self::with_instruments(Self::default_bench())
    }

    /// Backend serving `instruments`.
    pub fn with_instruments(instruments: Vec<Instrument>) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            bench: Arc::new(RwLock::new(instruments)),
            last_scan: Arc::new(RwLock::new(Vec::new())),
            outputs: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            status_requests: Arc::new(RwLock::new(Vec::new())),
            rejection: Arc::new(RwLock::new(None)),
            scan_failure: Arc::new(RwLock::new(None)),
            latency_ms: Arc::new(AtomicU64::new(0)),
            status_endpoint: Arc::new(AtomicBool::new(true)),
            offline: Arc::new(AtomicBool::new(false)),
            scan_calls: Arc::new(AtomicU64::new(0)),
            identity_calls: Arc::new(AtomicU64::new(0)),
            session_id,
        }
    }

    /// The instruments of the default bench.
    pub fn default_bench() -> Vec<Instrument> {
        vec![
            Instrument::new("Chroma,62012P-80-60,0,1.00", "GPIB0::5::INSTR"),
            Instrument::new("Chroma,63206A,0,1.10", "GPIB0::7::INSTR"),
            Instrument::new("HEWLETT-PACKARD,34970A,0,13-2-2", "GPIB0::9::INSTR"),
            Instrument::new("TEKTRONIX,MSO54B,C012345,CF:91.1CT", "TCPIP0::192.168.0.50::INSTR"),
        ]
    }

    /// Builder-style latency applied to every call.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Builder-style status endpoint availability.
    #[must_use]
    pub fn with_status_endpoint(self, available: bool) -> Self {
        self.set_status_endpoint(available);
        self
    }

    /// Change the latency applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make `instrument-status` answer 404 (`false`) or serve status (`true`).
    pub fn set_status_endpoint(&self, available: bool) {
        self.status_endpoint.store(available, Ordering::SeqCst);
    }

    /// Make every call fail at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject every command with `detail` until cleared with `None`.
    pub async fn reject_commands(&self, detail: Option<&str>) {
        *self.rejection.write().await = detail.map(str::to_string);
    }

    /// Fail every scan with `detail` until cleared with `None`.
    pub async fn fail_scans(&self, detail: Option<&str>) {
        *self.scan_failure.write().await = detail.map(str::to_string);
    }

    /// Replace the instruments the next scan will report.
    pub async fn set_bench(&self, instruments: Vec<Instrument>) {
        *self.bench.write().await = instruments;
    }

    /// Every command received so far, in arrival order.
    pub async fn requests(&self) -> Vec<ControlRequest> {
        self.requests.read().await.clone()
    }

    /// Every status fetch received so far, in arrival order.
    pub async fn status_requests(&self) -> Vec<(InstrumentType, String)> {
        self.status_requests.read().await.clone()
    }

    /// Number of scans received.
    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    /// Number of identity fetches received.
    pub fn identity_calls(&self) -> u64 {
        self.identity_calls.load(Ordering::SeqCst)
    }

    /// Session id this backend reports.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn round_trip(&self) -> Result<(), BackendError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn is_on_bench(&self, address: &str) -> bool {
        self.bench.read().await.iter().any(|i| i.address == address)
    }

    async fn run_command(&self, request: &ControlRequest) -> ControlResult {
        if let Some(detail) = self.rejection.read().await.clone() {
            return ControlResult::rejected(detail);
        }
        if !self.is_on_bench(&request.address).await {
            return ControlResult::rejected(format!("No instrument at {}", request.address));
        }

        match (request.instrument_type, request.action.as_str()) {
            (InstrumentType::Daq, "read") => match &request.value {
                Some(ControlValue::Channels(channels)) if !channels.is_empty() => {
                    let results = simulate_readings(channels.iter().map(|c| (c.channel.as_str(), c.unit.as_str())));
                    ControlResult {
                        success: true,
                        message: Some(format!("Read {} channel(s)", results.len())),
                        results: Some(results),
                        ..Default::default()
                    }
                }
                _ => ControlResult::rejected("Missing DAQ channel parameter (value)"),
            },
            (InstrumentType::Daq, action) => {
                ControlResult::rejected(format!("Unsupported DAQ action: {action}"))
            }
            (InstrumentType::PowerSupply | InstrumentType::Eload, action) => {
                self.run_output_command(request, action).await
            }
            (InstrumentType::Scope, "get_waveform") => ControlResult {
                success: true,
                message: Some("Waveform captured".into()),
                data: Some(simulate_waveform()),
                ..Default::default()
            },
            (InstrumentType::Scope, "set_trigger") => {
                match scalar_value(request) {
                    Some(level) => {
                        let mut outputs = self.outputs.write().await;
                        outputs.entry(request.address.clone()).or_default().trigger_level = level;
                        ControlResult::ok(format!("Trigger level set to {level}"))
                    }
                    None => ControlResult::rejected("Invalid trigger level"),
                }
            }
            (InstrumentType::Scope, "autoset") => ControlResult::ok("Autoset complete"),
            (InstrumentType::Scope, action) => {
                ControlResult::rejected(format!("Unsupported scope action: {action}"))
            }
        }
    }

    async fn run_output_command(&self, request: &ControlRequest, action: &str) -> ControlResult {
        let mut outputs = self.outputs.write().await;
        let state = outputs.entry(request.address.clone()).or_default();
        match action {
            "on" | "off" => {
                state.enabled = action == "on";
                ControlResult::ok(format!("Instrument {} succeeded", action.to_uppercase()))
            }
            "set_voltage" | "set_current" => match scalar_value(request) {
                Some(v) if v >= 0.0 => {
                    if action == "set_voltage" {
                        state.voltage = v;
                    } else {
                        state.current = v;
                    }
                    ControlResult::ok(format!("{action} = {v}"))
                }
                _ => ControlResult::rejected(format!("Invalid value for {action}")),
            },
            other => ControlResult::rejected(format!(
                "Unsupported action '{other}' for {}",
                request.instrument_type
            )),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar_value(request: &ControlRequest) -> Option<f64> {
    match &request.value {
        Some(ControlValue::Scalar(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn simulate_readings<'a>(
    channels: impl Iterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, ChannelReading> {
    let mut rng = rand::thread_rng();
    channels
        .map(|(channel, unit)| {
            let reading = match unit {
                "VOLT" => ChannelReading::Number(rng.gen_range(0.0..5.0)),
                "RES" => ChannelReading::Number(rng.gen_range(900.0..1100.0)),
                "TEMP" => ChannelReading::Number(rng.gen_range(20.0..30.0)),
                _ => ChannelReading::Error(json!("unsupported unit")),
            };
            (channel.to_string(), reading)
        })
        .collect()
}

fn simulate_waveform() -> WaveformData {
    let mut rng = rand::thread_rng();
    let dt = 1.0e-6;
    let x: Vec<f64> = (0..WAVEFORM_SAMPLES).map(|i| i as f64 * dt).collect();
    let y = x
        .iter()
        .map(|t| (2.0 * std::f64::consts::PI * 10_000.0 * t).sin() + rng.gen_range(-0.05..0.05))
        .collect();
    WaveformData {
        x: Some(x),
        y: Some(y),
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    async fn scan_instruments(&self) -> Result<ScanResponse, BackendError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        if let Some(detail) = self.scan_failure.read().await.clone() {
            return Ok(ScanResponse {
                success: false,
                instruments: Vec::new(),
                detail: Some(detail),
            });
        }

        let instruments = self.bench.read().await.clone();
        *self.last_scan.write().await = instruments.clone();
        tracing::debug!(count = instruments.len(), "Simulated scan complete");
        Ok(ScanResponse {
            success: true,
            instruments,
            detail: None,
        })
    }

    async fn client_identity(&self) -> Result<ClientIdentity, BackendError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let instruments = self
            .last_scan
            .read()
            .await
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClientIdentity {
            ip: Some("127.0.0.1".into()),
            session_id: Some(self.session_id.clone()),
            status: Some("connected".into()),
            instruments,
        })
    }

    async fn execute_command(&self, request: &ControlRequest) -> Result<ControlResult, BackendError> {
        self.requests.write().await.push(request.clone());
        self.round_trip().await?;
        let result = self.run_command(request).await;
        tracing::debug!(
            panel = %request.instrument_type,
            address = %request.address,
            action = %request.action,
            success = result.success,
            "Simulated command executed"
        );
        Ok(result)
    }

    async fn instrument_status(
        &self,
        instrument_type: InstrumentType,
        address: &str,
    ) -> Result<StatusFields, BackendError> {
        self.status_requests
            .write()
            .await
            .push((instrument_type, address.to_string()));
        self.round_trip().await?;

        if !self.status_endpoint.load(Ordering::SeqCst) {
            return Err(BackendError::Status(404));
        }
        if !self.is_on_bench(address).await {
            return Err(BackendError::Status(503));
        }

        let state = self
            .outputs
            .read()
            .await
            .get(address)
            .cloned()
            .unwrap_or_default();
        let fields = json!({
            "output": if state.enabled { "ON" } else { "OFF" },
            "voltage": format!("{:.2}", state.voltage),
            "current": format!("{:.2}", state.current),
        });
        Ok(fields.as_object().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChannelRead;

    fn request(panel: InstrumentType, address: &str, action: &str, value: Option<ControlValue>) -> ControlRequest {
        ControlRequest {
            instrument_type: panel,
            address: address.into(),
            action: action.into(),
            value,
        }
    }

    #[tokio::test]
    async fn test_scan_reports_bench() {
        let backend = SimulatedBackend::new();
        let scan = backend.scan_instruments().await.unwrap();
        assert!(scan.success);
        assert_eq!(scan.instruments.len(), 4);
        assert_eq!(backend.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_identity_counts_last_scan() {
        let backend = SimulatedBackend::new();
        assert!(backend.client_identity().await.unwrap().instruments.is_empty());
        backend.scan_instruments().await.unwrap();
        let identity = backend.client_identity().await.unwrap();
        assert_eq!(identity.instruments.len(), 4);
        assert_eq!(identity.session_id.as_deref(), Some(backend.session_id()));
    }

    #[tokio::test]
    async fn test_daq_read_requires_channels() {
        let backend = SimulatedBackend::new();
        let empty = request(InstrumentType::Daq, "GPIB0::9::INSTR", "read", Some(ControlValue::Channels(vec![])));
        assert!(!backend.execute_command(&empty).await.unwrap().success);

        let read = request(
            InstrumentType::Daq,
            "GPIB0::9::INSTR",
            "read",
            Some(ControlValue::Channels(vec![ChannelRead::new("101", "VOLT")])),
        );
        let result = backend.execute_command(&read).await.unwrap();
        assert!(result.success);
        assert!(result.results.unwrap()["101"].as_number().is_some());
    }

    #[tokio::test]
    async fn test_output_state_feeds_status() {
        let backend = SimulatedBackend::new();
        let addr = "GPIB0::5::INSTR";
        backend
            .execute_command(&request(InstrumentType::PowerSupply, addr, "on", None))
            .await
            .unwrap();
        backend
            .execute_command(&request(
                InstrumentType::PowerSupply,
                addr,
                "set_voltage",
                Some(ControlValue::Scalar("12".into())),
            ))
            .await
            .unwrap();

        let status = backend
            .instrument_status(InstrumentType::PowerSupply, addr)
            .await
            .unwrap();
        assert_eq!(status["output"], "ON");
        assert_eq!(status["voltage"], "12.00");
    }

    #[tokio::test]
    async fn test_status_endpoint_can_be_absent() {
        let backend = SimulatedBackend::new().with_status_endpoint(false);
        let err = backend
            .instrument_status(InstrumentType::Eload, "GPIB0::7::INSTR")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Status(404));
    }

    #[tokio::test]
    async fn test_offline_is_transport_error() {
        let backend = SimulatedBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.scan_instruments().await,
            Err(BackendError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_address_rejected() {
        let backend = SimulatedBackend::new();
        let result = backend
            .execute_command(&request(InstrumentType::Scope, "GPIB0::99::INSTR", "autoset", None))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.reason().unwrap().contains("GPIB0::99::INSTR"));
    }
}
