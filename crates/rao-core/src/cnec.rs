//! Critical network elements under contingency (CNECs).
//!
//! A [`FlowCnec`] is a branch monitored in one state (base case or after a
//! contingency at a given instant), with thresholds on one or both sides.
//! Thresholds are stored in megawatts; accessors convert on request.

use crate::units::{flow_unit_multiplier, Side, Unit};
use serde::{Deserialize, Serialize};

/// Flow limits on one side of a monitored branch, in MW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowThreshold {
    pub side: Side,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// A monitored branch in one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCnec {
    pub id: String,
    pub name: String,
    /// Identifier of the network branch the flows are read on
    pub network_element: String,
    /// Transmission system operator owning the element
    #[serde(default)]
    pub operator: Option<String>,
    /// State (instant + optional contingency) the element is monitored in
    pub state: String,
    /// Margin counts in the functional cost
    #[serde(default = "default_true")]
    pub optimized: bool,
    /// Monitored element (MNEC): must not degrade beyond a tolerance
    #[serde(default)]
    pub monitored: bool,
    pub thresholds: Vec<FlowThreshold>,
    /// Nominal voltage of each side, in kV (left, right)
    pub nominal_voltage_kv: (f64, f64),
    /// Loop-flow threshold in MW, if the element is loop-flow constrained
    #[serde(default)]
    pub loop_flow_threshold: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl FlowCnec {
    /// Create an optimized element without thresholds, at 400 kV on both sides.
    pub fn new(id: impl Into<String>, state: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            network_element: id.clone(),
            id,
            operator: None,
            state: state.into(),
            optimized: true,
            monitored: false,
            thresholds: Vec::new(),
            nominal_voltage_kv: (400.0, 400.0),
            loop_flow_threshold: None,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_network_element(mut self, element: impl Into<String>) -> Self {
        self.network_element = element.into();
        self
    }

    pub fn with_threshold(mut self, side: Side, min: Option<f64>, max: Option<f64>) -> Self {
        self.thresholds.push(FlowThreshold { side, min, max });
        self
    }

    /// Symmetric limit `[-limit, limit]` on the left side.
    pub fn with_symmetric_limit(self, limit: f64) -> Self {
        self.with_threshold(Side::Left, Some(-limit), Some(limit))
    }

    pub fn with_nominal_voltage(mut self, left_kv: f64, right_kv: f64) -> Self {
        self.nominal_voltage_kv = (left_kv, right_kv);
        self
    }

    pub fn with_loop_flow_threshold(mut self, threshold: f64) -> Self {
        self.loop_flow_threshold = Some(threshold);
        self
    }

    pub fn monitored(mut self, optimized: bool) -> Self {
        self.monitored = true;
        self.optimized = optimized;
        self
    }

    pub fn not_optimized(mut self) -> Self {
        self.optimized = false;
        self
    }

    /// Sides carrying at least one threshold, in ascending order.
    pub fn monitored_sides(&self) -> Vec<Side> {
        let mut sides: Vec<Side> = self.thresholds.iter().map(|t| t.side).collect();
        sides.sort();
        sides.dedup();
        sides
    }

    pub fn nominal_voltage(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.nominal_voltage_kv.0,
            Side::Right => self.nominal_voltage_kv.1,
        }
    }

    /// Multiplier converting a MW value on `side` into `unit`.
    pub fn unit_multiplier(&self, side: Side, unit: Unit) -> f64 {
        flow_unit_multiplier(Unit::Megawatt, unit, self.nominal_voltage(side))
    }

    /// Tightest upper limit on `side`, in `unit`.
    pub fn upper_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| t.max)
            .reduce(f64::min)
            .map(|v| v * self.unit_multiplier(side, unit))
    }

    /// Tightest lower limit on `side`, in `unit`.
    pub fn lower_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        self.thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| t.min)
            .reduce(f64::max)
            .map(|v| v * self.unit_multiplier(side, unit))
    }

    /// Distance to the closest limit for a flow already expressed in `unit`.
    ///
    /// Returns `f64::INFINITY` when the side has no limit.
    pub fn compute_margin(&self, flow: f64, side: Side, unit: Unit) -> f64 {
        let upper = self
            .upper_bound(side, unit)
            .map(|ub| ub - flow)
            .unwrap_or(f64::INFINITY);
        let lower = self
            .lower_bound(side, unit)
            .map(|lb| flow - lb)
            .unwrap_or(f64::INFINITY);
        upper.min(lower)
    }

    /// Largest absolute limit of the element, in `unit`.
    pub fn largest_threshold(&self, unit: Unit) -> f64 {
        self.monitored_sides()
            .into_iter()
            .flat_map(|side| [self.upper_bound(side, unit), self.lower_bound(side, unit)])
            .flatten()
            .map(f64::abs)
            .fold(0.0, f64::max)
    }
}

/// Largest absolute threshold among `cnecs`, in `unit` (0 when empty).
pub fn largest_cnec_threshold<'a>(cnecs: impl IntoIterator<Item = &'a FlowCnec>, unit: Unit) -> f64 {
    cnecs
        .into_iter()
        .map(|c| c.largest_threshold(unit))
        .fold(0.0, f64::max)
}
