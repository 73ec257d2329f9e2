//! Breakpoint table and the temperature → duty decision.
//!
//! Slots carry an explicit validity flag (`Option`), so a deliberately
//! configured `(0, x)` breakpoint is never confused with an unused slot.

use serde::{Deserialize, Serialize};

use crate::error::TableError;

pub const N_MAX: usize = 20;
pub const MAX_THRESHOLD_C: i32 = 200;
pub const MAX_DUTY_PERCENT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    #[serde(rename = "temperature")]
    pub threshold_c: i32,
    #[serde(rename = "strength")]
    pub duty_percent: i32,
}

impl Breakpoint {
    pub fn new(threshold_c: i32, duty_percent: i32) -> Self {
        Self {
            threshold_c,
            duty_percent,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0..=MAX_THRESHOLD_C).contains(&self.threshold_c) {
            return Err("temperature must be between 0 and 200");
        }
        if !(0..=MAX_DUTY_PERCENT as i32).contains(&self.duty_percent) {
            return Err("strength must be between 0 and 100");
        }
        Ok(())
    }

    /// Duty as a percentage; only meaningful once `validate` passed.
    pub fn duty(&self) -> u8 {
        self.duty_percent.clamp(0, MAX_DUTY_PERCENT as i32) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutopilotTable {
    slots: [Option<Breakpoint>; N_MAX],
}

impl Default for AutopilotTable {
    fn default() -> Self {
        Self {
            slots: [None; N_MAX],
        }
    }
}

impl AutopilotTable {
    /// Builds a table from a list, validating every entry first.
    pub fn from_entries(entries: &[Breakpoint]) -> Result<Self, TableError> {
        if entries.len() > N_MAX {
            return Err(TableError::TooManyEntries {
                len: entries.len(),
                max: N_MAX,
            });
        }
        for (index, entry) in entries.iter().enumerate() {
            entry
                .validate()
                .map_err(|reason| TableError::InvalidConfiguration { index, reason })?;
        }

        let mut sorted = entries.to_vec();
        // Stable: equal thresholds keep the order they were given in.
        sorted.sort_by_key(|entry| entry.threshold_c);

        let mut table = Self::default();
        for (slot, entry) in table.slots.iter_mut().zip(sorted) {
            *slot = Some(entry);
        }
        Ok(table)
    }

    /// Replaces the whole table. On error `self` is left untouched.
    pub fn replace(&mut self, entries: &[Breakpoint]) -> Result<(), TableError> {
        *self = Self::from_entries(entries)?;
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &Breakpoint> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot(&self, index: usize) -> Option<&Breakpoint> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Writes a single slot, used by the codec when restoring a persisted table.
    pub fn set_slot(&mut self, index: usize, entry: Breakpoint) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(entry);
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Breakpoint> {
        self.entries().copied().collect()
    }

    /// Duty of the first breakpoint whose threshold exceeds the rounded
    /// temperature. `None` means no breakpoint applies and the caller keeps
    /// its previous duty.
    pub fn duty_for(&self, temperature_c: f32) -> Option<u8> {
        if !temperature_c.is_finite() {
            return None;
        }
        let rounded = temperature_c.round() as i32;
        self.entries()
            .find(|entry| entry.threshold_c > rounded)
            .map(Breakpoint::duty)
    }
}
