// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of TBNScope — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Concentration units and their exact conversion factors to Molar.

use std::fmt;
use std::str::FromStr;

use num_rational::Ratio;

use crate::error::TbnError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    PicoMolar,
    NanoMolar,
    MicroMolar,
    MilliMolar,
    Molar,
}

pub const ALL_UNITS: [Unit; 5] = [
    Unit::PicoMolar,
    Unit::NanoMolar,
    Unit::MicroMolar,
    Unit::MilliMolar,
    Unit::Molar,
];

impl Unit {
    /// Exact rational factor converting this unit to Molar.
    pub fn factor_to_molar(self) -> Ratio<i64> {
        match self {
            Unit::PicoMolar => Ratio::new(1, 1_000_000_000_000),
            Unit::NanoMolar => Ratio::new(1, 1_000_000_000),
            Unit::MicroMolar => Ratio::new(1, 1_000_000),
            Unit::MilliMolar => Ratio::new(1, 1_000),
            Unit::Molar => Ratio::new(1, 1),
        }
    }

    /// Converts a value in this unit to Molar. The factors are powers of ten
    /// representable exactly in f64, so the conversion is a single rounding.
    pub fn to_molar(self, value: f64) -> f64 {
        let f = self.factor_to_molar();
        value * (*f.numer() as f64) / (*f.denom() as f64)
    }

    /// Converts a value in Molar to this unit.
    pub fn from_molar(self, value: f64) -> f64 {
        let f = self.factor_to_molar();
        value * (*f.denom() as f64) / (*f.numer() as f64)
    }

    /// Long-form name, e.g. `nanoMolar (nM)`.
    pub fn display_name(self) -> &'static str {
        match self {
            Unit::PicoMolar => "picoMolar (pM)",
            Unit::NanoMolar => "nanoMolar (nM)",
            Unit::MicroMolar => "microMolar (uM)",
            Unit::MilliMolar => "milliMolar (mM)",
            Unit::Molar => "Molar (M)",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::PicoMolar => "pM",
            Unit::NanoMolar => "nM",
            Unit::MicroMolar => "uM",
            Unit::MilliMolar => "mM",
            Unit::Molar => "M",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = TbnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pM" => Ok(Unit::PicoMolar),
            "nM" => Ok(Unit::NanoMolar),
            "uM" => Ok(Unit::MicroMolar),
            "mM" => Ok(Unit::MilliMolar),
            "M" => Ok(Unit::Molar),
            other => Err(TbnError::UnknownUnit(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_molar() {
        for unit in ALL_UNITS {
            let molar = unit.to_molar(42.0);
            assert_eq!(unit.from_molar(molar), 42.0);
        }
    }

    #[test]
    fn nanomolar_factor() {
        assert_eq!(Unit::NanoMolar.to_molar(20.0), 2.0e-8);
        assert_eq!(Unit::Molar.to_molar(1.5), 1.5);
    }

    #[test]
    fn parses_symbols() {
        assert_eq!("nM".parse::<Unit>().unwrap(), Unit::NanoMolar);
        assert!("kM".parse::<Unit>().is_err());
    }
}
