//! Energy focus domain model.
//!
//! Holds the canonical type → color/frequency table. Every consumer derives
//! display attributes from [`EnergyType`] methods; no other copy of the table
//! exists.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::ShifterError;

/// One of the seven energy-focus (chakra) types, ordered low → high.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter,
    Default,
)]
pub enum EnergyType {
    Root,
    Sacral,
    SolarPlexus,
    #[default]
    Heart,
    Throat,
    ThirdEye,
    Crown,
}

impl EnergyType {
    /// All types in canonical low → high order.
    pub const ALL: [EnergyType; 7] = [
        EnergyType::Root,
        EnergyType::Sacral,
        EnergyType::SolarPlexus,
        EnergyType::Heart,
        EnergyType::Throat,
        EnergyType::ThirdEye,
        EnergyType::Crown,
    ];

    /// Solfeggio frequency in Hz.
    pub const fn frequency(self) -> u32 {
        match self {
            EnergyType::Root => 396,
            EnergyType::Sacral => 417,
            EnergyType::SolarPlexus => 528,
            EnergyType::Heart => 639,
            EnergyType::Throat => 741,
            EnergyType::ThirdEye => 852,
            EnergyType::Crown => 963,
        }
    }

    /// Display color as a `#RRGGBB` hex string.
    pub const fn color(self) -> &'static str {
        match self {
            EnergyType::Root => "#DC2626",
            EnergyType::Sacral => "#EA580C",
            EnergyType::SolarPlexus => "#EAB308",
            EnergyType::Heart => "#16A34A",
            EnergyType::Throat => "#2563EB",
            EnergyType::ThirdEye => "#4F46E5",
            EnergyType::Crown => "#9333EA",
        }
    }
}

impl FromStr for EnergyType {
    type Err = ShifterError;

    /// Accepts variant names case-insensitively, ignoring `-`, `_` and spaces
    /// (`"solar-plexus"`, `"Third Eye"`, `"crown"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        EnergyType::iter()
            .find(|ty| ty.to_string().to_lowercase() == normalized)
            .ok_or_else(|| ShifterError::InvalidEnergyType(s.to_string()))
    }
}

/// Snapshot of the active energy focus and its derived attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyState {
    #[serde(rename = "type")]
    pub energy_type: EnergyType,
    pub color: String,
    pub frequency: u32,
    /// Strength of the current focus, always within [0, 1].
    pub intensity: f64,
}

impl EnergyState {
    pub fn new(energy_type: EnergyType, intensity: f64) -> Self {
        Self {
            energy_type,
            color: energy_type.color().to_string(),
            frequency: energy_type.frequency(),
            intensity: clamp_intensity(intensity),
        }
    }

    /// Switches to `energy_type`, re-deriving color and frequency.
    ///
    /// Returns `false` when `energy_type` was already active.
    pub fn set_type(&mut self, energy_type: EnergyType) -> bool {
        if self.energy_type == energy_type {
            return false;
        }
        self.energy_type = energy_type;
        self.color = energy_type.color().to_string();
        self.frequency = energy_type.frequency();
        true
    }
}

impl Default for EnergyState {
    fn default() -> Self {
        Self::new(EnergyType::default(), 0.5)
    }
}

/// Clamps an intensity to [0, 1]. NaN maps to 0.
pub fn clamp_intensity(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
