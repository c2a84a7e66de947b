//! CLI Entry Point for ate-control
//!
//! Drives the controller against the simulated bench from a terminal:
//! - `detect`: scan and list instruments
//! - `control`: run one action on one panel
//! - `daq-read`: read DAQ channels
//! - `watch`: bind a panel and print its live status
//! - `config`: print the effective configuration
//!
//! # Usage
//!
//! ```bash
//! ate-control detect
//! ate-control control power-supply set_voltage --value 12
//! ate-control daq-read --channel 101:VOLT --channel 102:TEMP
//! ate-control watch eload --seconds 10
//! ```

use anyhow::{bail, Context, Result};
use ate_control::backend::SimulatedBackend;
use ate_control::config::{ControllerConfig, DEFAULT_CONFIG_PATH};
use ate_control::controller::{Controller, ControllerHandle};
use ate_control::dispatch::value_input_for;
use ate_control::form::{ChannelRow, FormValues, StaticForms};
use ate_control::instrument::InstrumentType;
use ate_control::logging;
use ate_control::view::UiEvent;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ate-control")]
#[command(about = "Instrument session and command-dispatch engine for ATE benches", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for instruments and list them
    Detect,

    /// Run one action on a panel
    Control {
        /// Panel type (power-supply, eload, daq, scope)
        panel: String,
        /// Action name (on, off, set_voltage, set_current, set_trigger, get_waveform, autoset, ...)
        action: String,
        /// Value for set-style actions
        #[arg(long)]
        value: Option<String>,
        /// Instrument address; defaults to the bench instrument for the panel
        #[arg(long)]
        address: Option<String>,
    },

    /// Read DAQ channels
    DaqRead {
        /// Channel and unit, e.g. 101:VOLT (repeatable)
        #[arg(long = "channel", required = true)]
        channels: Vec<String>,
        /// DAQ address; defaults to the bench DAQ
        #[arg(long)]
        address: Option<String>,
    },

    /// Bind a panel and print its live status
    Watch {
        /// Panel type (power-supply, eload, daq, scope)
        panel: String,
        /// Instrument address; defaults to the bench instrument for the panel
        #[arg(long)]
        address: Option<String>,
        /// How long to watch
        #[arg(long, default_value = "10")]
        seconds: u64,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ControllerConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(format) = cli.log_format {
        config.application.log_format = format;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::Detect => detect(&config).await,
        Commands::Control {
            panel,
            action,
            value,
            address,
        } => control(&config, &panel, &action, value, address).await,
        Commands::DaqRead { channels, address } => daq_read(&config, &channels, address).await,
        Commands::Watch {
            panel,
            address,
            seconds,
        } => watch(&config, &panel, address, seconds).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn start(config: &ControllerConfig, forms: Arc<StaticForms>) -> ControllerHandle {
    let backend = SimulatedBackend::new()
        .with_latency(config.simulation.latency)
        .with_status_endpoint(config.simulation.status_endpoint);
    Controller::spawn(config.clone(), Arc::new(backend), forms)
}

/// Bench address for `panel` when none is given.
fn default_address(panel: InstrumentType) -> String {
    let index = match panel {
        InstrumentType::PowerSupply => 0,
        InstrumentType::Eload => 1,
        InstrumentType::Daq => 2,
        InstrumentType::Scope => 3,
    };
    SimulatedBackend::default_bench()
        .get(index)
        .map(|i| i.address.clone())
        .unwrap_or_default()
}

async fn detect(config: &ControllerConfig) -> Result<()> {
    let handle = start(config, Arc::new(StaticForms::new()));

    println!("🔍 Scanning for instruments...");
    let instruments = handle.detect().await?;
    let snapshot = handle.snapshot().await?;

    println!("✅ Detected {} instrument(s)", instruments.len());
    for line in snapshot.instrument_list() {
        println!("   - {line}");
    }

    let session = handle.refresh_session().await?;
    println!();
    println!("Client IP:   {}", session.ip);
    println!("Session ID:  {}", session.session_id);
    println!("Status:      {}", session.connectivity.label());
    println!("Instruments: {}", session.instrument_count);

    handle.shutdown().await?;
    Ok(())
}

async fn control(
    config: &ControllerConfig,
    panel: &str,
    action: &str,
    value: Option<String>,
    address: Option<String>,
) -> Result<()> {
    let panel: InstrumentType = panel.parse()?;
    let forms = Arc::new(StaticForms::new());
    if let (Some(input), Some(value)) = (value_input_for(panel, action), value) {
        forms.set(panel, FormValues::new().with_input(input, value));
    }

    let handle = start(config, forms);
    handle.detect().await?;
    let address = address.unwrap_or_else(|| default_address(panel));
    handle.set_binding(panel, &address).await?;

    println!("⚙️  Executing {action} on {} ({address})...", panel.label());
    let outcome = handle.dispatch(panel, action).await;
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;

    match outcome {
        Ok(result) => {
            println!("✅ Operation succeeded");
            if let Some(message) = result.message {
                println!("   {message}");
            }
            if let Some(view) = snapshot.panel(panel) {
                if let Some(ate_control::view::WaveformView::Series { x, y }) = &view.waveform {
                    println!("   Waveform: {} samples, y[0] = {:.4}", x.len(), y.first().copied().unwrap_or_default());
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {e}");
            Err(e.into())
        }
    }
}

fn parse_channel(entry: &str) -> Result<ChannelRow> {
    match entry.split_once(':') {
        Some((channel, unit)) if !channel.is_empty() && !unit.is_empty() => {
            Ok(ChannelRow::new(channel, unit.to_uppercase()))
        }
        _ => bail!("invalid channel '{entry}', expected CHANNEL:UNIT (e.g. 101:VOLT)"),
    }
}

async fn daq_read(
    config: &ControllerConfig,
    channels: &[String],
    address: Option<String>,
) -> Result<()> {
    let mut form = FormValues::new();
    for entry in channels {
        form.push_channel_row(parse_channel(entry)?);
    }
    let forms = Arc::new(StaticForms::new());
    forms.set(InstrumentType::Daq, form);

    let handle = start(config, forms);
    handle.detect().await?;
    let address = address.unwrap_or_else(|| default_address(InstrumentType::Daq));
    handle.set_binding(InstrumentType::Daq, &address).await?;

    println!("📊 Reading {} channel(s) from {address}...", channels.len());
    let outcome = handle.dispatch(InstrumentType::Daq, "read").await;
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;

    if let Err(e) = outcome {
        eprintln!("❌ {e}");
        return Err(e.into());
    }
    if let Some(readout) = snapshot.panel(InstrumentType::Daq).and_then(|p| p.daq.as_ref()) {
        for (channel, value) in &readout.channels {
            println!("   {channel}: {}", value.display());
        }
    }
    Ok(())
}

async fn watch(
    config: &ControllerConfig,
    panel: &str,
    address: Option<String>,
    seconds: u64,
) -> Result<()> {
    let panel: InstrumentType = panel.parse()?;
    let handle = start(config, Arc::new(StaticForms::new()));
    let mut events = handle.subscribe();

    handle.detect().await?;
    let address = address.unwrap_or_else(|| default_address(panel));
    handle.set_binding(panel, &address).await?;
    println!(
        "📡 Watching {} at {address} for {seconds}s (Ctrl+C to stop)",
        panel.label()
    );

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(UiEvent::Status { panel: p, display }) if p == panel => {
                    let line: Vec<String> = display
                        .items
                        .iter()
                        .map(|item| format!("{}: {}", item.label, item.value))
                        .collect();
                    println!("   {}", line.join(" | "));
                }
                Ok(UiEvent::Polling { panel: p, address: None }) if p == panel => {
                    println!("⚠️  Polling stopped");
                    break;
                }
                Ok(UiEvent::Session(info)) => {
                    println!("   session {} ({})", info.session_id, info.connectivity.label());
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    println!("\n👋 Shutting down...");
    handle.shutdown().await?;
    Ok(())
}
