//! Physical units used for margins and thresholds.
//!
//! Flows are exchanged in megawatts. Margins may be requested in amperes, in
//! which case the conversion `I[A] = P[MW] · 1000 / (√3 · Unom[kV])` is applied
//! with the nominal voltage of the monitored side.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit in which margins and costs are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Megawatt,
    Ampere,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Megawatt => write!(f, "MW"),
            Unit::Ampere => write!(f, "A"),
        }
    }
}

/// Monitored side of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Multiplier turning a value expressed in `from` into the same value in `to`,
/// for an element of the given nominal voltage.
pub fn flow_unit_multiplier(from: Unit, to: Unit, nominal_voltage_kv: f64) -> f64 {
    let mw_to_ampere = 1000.0 / (3f64.sqrt() * nominal_voltage_kv);
    match (from, to) {
        (Unit::Megawatt, Unit::Ampere) => mw_to_ampere,
        (Unit::Ampere, Unit::Megawatt) => 1.0 / mw_to_ampere,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megawatt_to_ampere_at_400kv() {
        let k = flow_unit_multiplier(Unit::Megawatt, Unit::Ampere, 400.0);
        // 1 MW at 400 kV ≈ 1.443 A
        assert!((k - 1.443_375_673).abs() < 1e-6);
    }

    #[test]
    fn conversions_are_inverse() {
        let there = flow_unit_multiplier(Unit::Megawatt, Unit::Ampere, 225.0);
        let back = flow_unit_multiplier(Unit::Ampere, Unit::Megawatt, 225.0);
        assert!((there * back - 1.0).abs() < 1e-12);
        assert_eq!(flow_unit_multiplier(Unit::Megawatt, Unit::Megawatt, 225.0), 1.0);
    }

    #[test]
    fn unit_serializes_snake_case() {
        let json = serde_json::to_string(&Unit::Ampere).unwrap();
        assert_eq!(json, "\"ampere\"");
    }
}
