//! Panel Binding Table
//!
//! One entry per [`InstrumentType`]: the selected instrument address (if any)
//! and whether the panel's action controls are currently enabled.
//!
//! # Invariants
//!
//! - Exactly one entry per instrument type.
//! - An unbound panel always has its controls disabled.
//!
//! The table itself does not know about polling or in-flight dispatches; the
//! controller reacts to the [`BindingChange`] returned by [`PanelBindingTable::set`].

use crate::instrument::InstrumentType;
use serde::Serialize;
use std::collections::BTreeMap;

/// Binding state of one panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PanelBinding {
    /// Selected instrument address; `None` means unbound
    pub selected_address: Option<String>,
    /// Whether the panel's action controls accept input
    pub controls_enabled: bool,
}

/// What a call to [`PanelBindingTable::set`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingChange {
    /// The panel is now unbound.
    Cleared {
        /// Address that was bound before, if any
        previous: Option<String>,
    },
    /// The panel is now bound to `address`.
    Bound {
        /// Address that was bound before, if any
        previous: Option<String>,
        /// Newly selected address
        address: String,
    },
}

impl BindingChange {
    /// True if the panel was bound before the change.
    #[must_use]
    pub fn had_binding(&self) -> bool {
        match self {
            Self::Cleared { previous } | Self::Bound { previous, .. } => previous.is_some(),
        }
    }

    /// True if the effective address differs from the previous one.
    #[must_use]
    pub fn address_changed(&self) -> bool {
        match self {
            Self::Cleared { previous } => previous.is_some(),
            Self::Bound { previous, address } => previous.as_deref() != Some(address.as_str()),
        }
    }
}

/// Maps each panel slot to zero-or-one selected instrument address.
#[derive(Debug, Clone)]
pub struct PanelBindingTable {
    panels: BTreeMap<InstrumentType, PanelBinding>,
}

impl Default for PanelBindingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelBindingTable {
    /// Table with every panel unbound and disabled.
    pub fn new() -> Self {
        let panels = InstrumentType::ALL
            .iter()
            .map(|ty| (*ty, PanelBinding::default()))
            .collect();
        Self { panels }
    }

    /// Select `address` for `panel`. An empty (or blank) address unbinds.
    ///
    /// Binding enables the panel's controls; unbinding disables them.
    pub fn set(&mut self, panel: InstrumentType, address: &str) -> BindingChange {
        let entry = self.panels.entry(panel).or_default();
        let previous = entry.selected_address.take();
        let address = address.trim();

        if address.is_empty() {
            entry.controls_enabled = false;
            BindingChange::Cleared { previous }
        } else {
            entry.selected_address = Some(address.to_string());
            entry.controls_enabled = true;
            BindingChange::Bound {
                previous,
                address: address.to_string(),
            }
        }
    }

    /// Currently selected address for `panel`.
    #[must_use]
    pub fn get(&self, panel: InstrumentType) -> Option<&str> {
        self.panels
            .get(&panel)
            .and_then(|b| b.selected_address.as_deref())
    }

    /// Full binding entry for `panel`.
    #[must_use]
    pub fn binding(&self, panel: InstrumentType) -> PanelBinding {
        self.panels.get(&panel).cloned().unwrap_or_default()
    }

    /// Whether `panel`'s controls are enabled.
    #[must_use]
    pub fn controls_enabled(&self, panel: InstrumentType) -> bool {
        self.panels
            .get(&panel)
            .is_some_and(|b| b.controls_enabled)
    }

    /// Enable or disable `panel`'s controls.
    ///
    /// Enabling an unbound panel is refused; returns the resulting state.
    pub fn set_controls_enabled(&mut self, panel: InstrumentType, enabled: bool) -> bool {
        let entry = self.panels.entry(panel).or_default();
        entry.controls_enabled = enabled && entry.selected_address.is_some();
        entry.controls_enabled
    }

    /// Panels that currently have an address selected.
    pub fn bound_panels(&self) -> impl Iterator<Item = (InstrumentType, &str)> + '_ {
        self.panels
            .iter()
            .filter_map(|(ty, b)| b.selected_address.as_deref().map(|a| (*ty, a)))
    }
}
