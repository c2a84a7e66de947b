//! Instrument Registry
//!
//! Holds the instruments found by the most recent successful detection. The
//! list is only ever replaced wholesale; a failed scan leaves it untouched.
//! The registry also owns the in-flight guard that turns a second concurrent
//! `detect()` into a no-op.

use crate::instrument::Instrument;

/// Discovered instruments plus the detection in-flight guard.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
    detecting: bool,
    generation: u64,
}

impl InstrumentRegistry {
    /// Empty registry, no detection in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the in-flight guard.
    ///
    /// Returns `false` (and changes nothing) if a detection is already running.
    pub fn begin_detection(&mut self) -> bool {
        if self.detecting {
            return false;
        }
        self.detecting = true;
        true
    }

    /// Release the guard and replace the list with `instruments`.
    pub fn complete_detection(&mut self, instruments: Vec<Instrument>) {
        self.detecting = false;
        self.instruments = instruments;
        self.generation += 1;
    }

    /// Release the guard, keeping the previous list.
    pub fn abort_detection(&mut self) {
        self.detecting = false;
    }

    /// True while a detection is in flight.
    #[must_use]
    pub fn is_detecting(&self) -> bool {
        self.detecting
    }

    /// Instruments from the last successful detection.
    #[must_use]
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Number of completed detections; bumps on every wholesale replacement.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if `address` belongs to a discovered instrument.
    #[must_use]
    pub fn contains_address(&self, address: &str) -> bool {
        self.instruments.iter().any(|i| i.address == address)
    }

    /// Addresses offered as selection options for every panel.
    #[must_use]
    pub fn selectable_addresses(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.address.clone()).collect()
    }
}
