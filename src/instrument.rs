//! Instrument identity types.
//!
//! An [`Instrument`] is the opaque `{name, address}` pair a backend scan reports.
//! [`InstrumentType`] names the four panel slots an instrument can be bound to.

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Panel slot an instrument can be bound to.
///
/// The wire form is the kebab-case name used by the backend
/// (`power-supply`, `eload`, `daq`, `scope`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentType {
    /// Programmable DC power supply
    PowerSupply,
    /// Electronic load
    Eload,
    /// Data-acquisition / switch unit
    Daq,
    /// Oscilloscope
    Scope,
}

impl InstrumentType {
    /// Every panel slot, in display order.
    pub const ALL: [InstrumentType; 4] = [
        InstrumentType::PowerSupply,
        InstrumentType::Eload,
        InstrumentType::Daq,
        InstrumentType::Scope,
    ];

    /// Returns the wire name of this slot.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PowerSupply => "power-supply",
            Self::Eload => "eload",
            Self::Daq => "daq",
            Self::Scope => "scope",
        }
    }

    /// Returns a short label for display in the UI.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PowerSupply => "Power Supply",
            Self::Eload => "Electronic Load",
            Self::Daq => "DAQ",
            Self::Scope => "Oscilloscope",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "power-supply" => Ok(Self::PowerSupply),
            "eload" => Ok(Self::Eload),
            "daq" => Ok(Self::Daq),
            "scope" => Ok(Self::Scope),
            other => Err(ControlError::UnknownInstrumentType(other.to_string())),
        }
    }
}

/// A discovered instrument.
///
/// Immutable once created; the registry replaces the whole list on every
/// successful detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Identification string (usually the `*IDN?` reply)
    pub name: String,
    /// VISA resource address, e.g. `GPIB0::5::INSTR`
    pub address: String,
}

impl Instrument {
    /// Create a new instrument record.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Label used for selection options: `"<name> (<address>)"`.
    #[must_use]
    pub fn option_label(&self) -> String {
        format!("{} ({})", self.name, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_types() {
        for ty in InstrumentType::ALL {
            assert_eq!(ty.as_str().parse::<InstrumentType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = "power_supply".parse::<InstrumentType>().unwrap_err();
        assert!(matches!(err, ControlError::UnknownInstrumentType(ref s) if s == "power_supply"));
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&InstrumentType::PowerSupply).unwrap();
        assert_eq!(json, "\"power-supply\"");
        let back: InstrumentType = serde_json::from_str("\"scope\"").unwrap();
        assert_eq!(back, InstrumentType::Scope);
    }

    #[test]
    fn test_option_label() {
        let inst = Instrument::new("PSU-1", "GPIB::5");
        assert_eq!(inst.option_label(), "PSU-1 (GPIB::5)");
    }
}
