//! Panel form snapshots.
//!
//! The controller never reads widgets directly. The presentation layer hands it
//! a [`FormValues`] snapshot through the [`FormSource`] trait whenever a
//! dispatch needs the panel's current inputs.

use crate::instrument::InstrumentType;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Input holding the power supply's voltage setpoint.
pub const INPUT_PSU_VOLTAGE: &str = "value-power-supply-voltage";
/// Input holding the power supply's current limit.
pub const INPUT_PSU_CURRENT: &str = "value-power-supply-current";
/// Input holding the electronic load's current setpoint.
pub const INPUT_ELOAD_CURRENT: &str = "value-eload-current";
/// Input holding the oscilloscope trigger level.
pub const INPUT_SCOPE_TRIGGER: &str = "value-scope-trigger";

/// One DAQ channel row as displayed: channel text box plus unit selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    /// Channel identifier text
    pub channel: String,
    /// Selected unit (`VOLT`, `RES`, `TEMP`)
    pub unit: String,
}

impl ChannelRow {
    /// Create a channel row.
    pub fn new(channel: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            unit: unit.into(),
        }
    }
}

/// Current values of one panel's inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    inputs: HashMap<String, String>,
    channel_rows: Vec<ChannelRow>,
}

impl FormValues {
    /// Empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style input setter.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Builder-style channel row append (rows keep insertion order).
    #[must_use]
    pub fn with_channel_row(mut self, channel: impl Into<String>, unit: impl Into<String>) -> Self {
        self.channel_rows.push(ChannelRow::new(channel, unit));
        self
    }

    /// Set a named input.
    pub fn set_input(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inputs.insert(name.into(), value.into());
    }

    /// Append a channel row at the end of the display order.
    pub fn push_channel_row(&mut self, row: ChannelRow) {
        self.channel_rows.push(row);
    }

    /// Value of a named input, if present on the form.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(String::as_str)
    }

    /// Channel rows in display order.
    #[must_use]
    pub fn channel_rows(&self) -> &[ChannelRow] {
        &self.channel_rows
    }
}

/// Supplies the current form values of a panel.
///
/// Implemented by the presentation layer; must be cheap and side-effect free.
pub trait FormSource: Send + Sync {
    /// Snapshot of `panel`'s inputs at this instant.
    fn snapshot(&self, panel: InstrumentType) -> FormValues;
}

/// In-memory form store, used by the CLI and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticForms {
    forms: Arc<RwLock<HashMap<InstrumentType, FormValues>>>,
}

impl StaticForms {
    /// Empty form store (every panel snapshot is empty).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `panel`'s form.
    pub fn set(&self, panel: InstrumentType, values: FormValues) {
        if let Ok(mut forms) = self.forms.write() {
            forms.insert(panel, values);
        }
    }

    /// Mutate `panel`'s form in place.
    pub fn update(&self, panel: InstrumentType, f: impl FnOnce(&mut FormValues)) {
        if let Ok(mut forms) = self.forms.write() {
            f(forms.entry(panel).or_default());
        }
    }
}

impl FormSource for StaticForms {
    fn snapshot(&self, panel: InstrumentType) -> FormValues {
        self.forms
            .read()
            .ok()
            .and_then(|forms| forms.get(&panel).cloned())
            .unwrap_or_default()
    }
}
