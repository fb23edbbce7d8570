//! Deterministic linearised network model.
//!
//! [`LinearNetwork`] stores, per monitored element, a base flow, per range
//! action sensitivities (with an optional quadratic term so that relinearising
//! around a new setpoint actually changes the coefficients) and the effect of
//! each network action. [`LinearSensitivityProvider`] evaluates that model as a
//! sensitivity engine. Both are used by tests and demos; they are exact for the
//! behaviours the optimizer relies on, not a physical load flow.
//!
//! ```text
//! flow(c) = base(c) + Σ_na shift(na, c) + Σ_ra [ s(c, ra)·Δ + q(c, ra)·Δ² ]
//! sens(c, ra) = s(c, ra) + 2·q(c, ra)·Δ        with Δ = setpoint − initial
//! ```

use crate::actions::{NetworkAction, RangeAction};
use crate::cnec::FlowCnec;
use crate::error::{RaoError, RaoResult};
use crate::network::{NetworkState, SensitivityComputation, SensitivityProvider};
use crate::results::{ComputationStatus, FlowResult, SensitivityResult};
use crate::units::Unit;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Effect of applying one network action.
#[derive(Debug, Clone, Default)]
pub struct ActionEffect {
    /// MW added to the flow of each element
    pub flow_shift: BTreeMap<String, f64>,
    /// (element, range action) sensitivities replacing the base ones
    pub sensitivity_override: BTreeMap<(String, String), f64>,
    /// States whose computation fails once the action is applied
    pub failed_states: BTreeSet<String>,
    /// The whole computation fails once the action is applied
    pub fails_computation: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LinearNetwork {
    name: String,
    base_flows: BTreeMap<String, f64>,
    sensitivities: BTreeMap<(String, String), f64>,
    curvatures: BTreeMap<(String, String), f64>,
    ptdf_zonal_sums: BTreeMap<String, f64>,
    commercial_flows: BTreeMap<String, f64>,
    effects: BTreeMap<String, ActionEffect>,
    initial_setpoints: BTreeMap<String, f64>,
    setpoints: BTreeMap<String, f64>,
    applied: BTreeSet<String>,
}

impl LinearNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_flow(mut self, cnec_id: &str, flow_mw: f64) -> Self {
        self.base_flows.insert(cnec_id.to_string(), flow_mw);
        self
    }

    pub fn with_sensitivity(mut self, cnec_id: &str, range_action_id: &str, value: f64) -> Self {
        self.sensitivities
            .insert((cnec_id.to_string(), range_action_id.to_string()), value);
        self
    }

    pub fn with_curvature(mut self, cnec_id: &str, range_action_id: &str, value: f64) -> Self {
        self.curvatures
            .insert((cnec_id.to_string(), range_action_id.to_string()), value);
        self
    }

    pub fn with_ptdf_zonal_sum(mut self, cnec_id: &str, value: f64) -> Self {
        self.ptdf_zonal_sums.insert(cnec_id.to_string(), value);
        self
    }

    pub fn with_commercial_flow(mut self, cnec_id: &str, flow_mw: f64) -> Self {
        self.commercial_flows.insert(cnec_id.to_string(), flow_mw);
        self
    }

    pub fn with_range_action(mut self, range_action_id: &str, initial_setpoint: f64) -> Self {
        self.initial_setpoints
            .insert(range_action_id.to_string(), initial_setpoint);
        self
    }

    pub fn with_action_effect(mut self, network_action_id: &str, effect: ActionEffect) -> Self {
        self.effects.insert(network_action_id.to_string(), effect);
        self
    }

    /// Shortcut for an action that only shifts flows.
    pub fn with_flow_shift(self, network_action_id: &str, shifts: &[(&str, f64)]) -> Self {
        let effect = ActionEffect {
            flow_shift: shifts.iter().map(|(c, v)| (c.to_string(), *v)).collect(),
            ..ActionEffect::default()
        };
        self.with_action_effect(network_action_id, effect)
    }

    pub fn applied_network_actions(&self) -> &BTreeSet<String> {
        &self.applied
    }

    fn delta(&self, range_action_id: &str) -> f64 {
        let initial = self.initial_setpoints.get(range_action_id).copied().unwrap_or(0.0);
        self.setpoints.get(range_action_id).copied().unwrap_or(initial) - initial
    }

    fn applied_effects(&self) -> impl Iterator<Item = &ActionEffect> {
        self.applied.iter().filter_map(|id| self.effects.get(id))
    }

    fn linear_sensitivity(&self, cnec_id: &str, range_action_id: &str) -> f64 {
        let key = (cnec_id.to_string(), range_action_id.to_string());
        self.applied_effects()
            .filter_map(|e| e.sensitivity_override.get(&key))
            .last()
            .or_else(|| self.sensitivities.get(&key))
            .copied()
            .unwrap_or(0.0)
    }

    fn curvature(&self, cnec_id: &str, range_action_id: &str) -> f64 {
        self.curvatures
            .get(&(cnec_id.to_string(), range_action_id.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Flow of `cnec_id` in the current state, in MW.
    pub fn flow(&self, cnec_id: &str, range_action_ids: &[&str]) -> f64 {
        let base = self.base_flows.get(cnec_id).copied().unwrap_or(0.0);
        let shift: f64 = self
            .applied_effects()
            .filter_map(|e| e.flow_shift.get(cnec_id))
            .sum();
        let ranges: f64 = range_action_ids
            .iter()
            .map(|ra| {
                let d = self.delta(ra);
                self.linear_sensitivity(cnec_id, ra) * d + self.curvature(cnec_id, ra) * d * d
            })
            .sum();
        base + shift + ranges
    }

    /// Local sensitivity of `cnec_id` to `range_action_id`, in MW per setpoint unit.
    pub fn local_sensitivity(&self, cnec_id: &str, range_action_id: &str) -> f64 {
        self.linear_sensitivity(cnec_id, range_action_id)
            + 2.0 * self.curvature(cnec_id, range_action_id) * self.delta(range_action_id)
    }
}

impl NetworkState for LinearNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply_network_action(&mut self, action: &NetworkAction) -> RaoResult<()> {
        self.applied.insert(action.id.clone());
        Ok(())
    }

    fn apply_range_action_setpoint(&mut self, action: &RangeAction, setpoint: f64) -> RaoResult<()> {
        if !self.initial_setpoints.contains_key(&action.id) {
            return Err(RaoError::Network(format!(
                "range action {} is not part of network {}",
                action.id, self.name
            )));
        }
        self.setpoints.insert(action.id.clone(), setpoint);
        Ok(())
    }

    fn range_action_setpoint(&self, action: &RangeAction) -> RaoResult<f64> {
        self.setpoints
            .get(&action.id)
            .or_else(|| self.initial_setpoints.get(&action.id))
            .copied()
            .ok_or_else(|| {
                RaoError::Network(format!(
                    "range action {} is not part of network {}",
                    action.id, self.name
                ))
            })
    }
}

/// Sensitivity engine evaluating a [`LinearNetwork`].
#[derive(Debug, Default)]
pub struct LinearSensitivityProvider {
    computations: AtomicUsize,
}

impl LinearSensitivityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of computations run so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

impl SensitivityProvider<LinearNetwork> for LinearSensitivityProvider {
    fn compute(
        &self,
        network: &LinearNetwork,
        cnecs: &[FlowCnec],
        range_actions: &[RangeAction],
    ) -> SensitivityComputation {
        self.computations.fetch_add(1, Ordering::Relaxed);

        if network.applied_effects().any(|e| e.fails_computation) {
            return SensitivityComputation {
                flows: FlowResult::new(),
                sensitivities: SensitivityResult::failed(),
            };
        }

        let failed_states: BTreeSet<&String> = network
            .applied_effects()
            .flat_map(|e| e.failed_states.iter())
            .collect();
        let ra_ids: Vec<&str> = range_actions.iter().map(|ra| ra.id.as_str()).collect();

        let mut flows = FlowResult::new();
        let mut sensitivities = SensitivityResult::new();
        for cnec in cnecs {
            if failed_states.contains(&cnec.state) {
                sensitivities.set_state_status(&cnec.state, ComputationStatus::Failure);
                continue;
            }
            sensitivities.set_state_status(&cnec.state, ComputationStatus::Default);
            let flow = network.flow(&cnec.id, &ra_ids);
            for side in cnec.monitored_sides() {
                flows.set_flow(&cnec.id, side, flow);
                flows.set_intensity(&cnec.id, side, flow * cnec.unit_multiplier(side, Unit::Ampere));
                if let Some(ptdf) = network.ptdf_zonal_sums.get(&cnec.id) {
                    flows.set_ptdf_zonal_sum(&cnec.id, side, *ptdf);
                }
                if let Some(commercial) = network.commercial_flows.get(&cnec.id) {
                    flows.set_commercial_flow(&cnec.id, side, *commercial);
                }
                for ra in &ra_ids {
                    sensitivities.set_sensitivity(&cnec.id, side, ra, network.local_sensitivity(&cnec.id, ra));
                }
            }
        }
        SensitivityComputation { flows, sensitivities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Appliable, RangeActionSetpoint};
    use crate::units::Side;

    fn network() -> LinearNetwork {
        LinearNetwork::new("two-area")
            .with_flow("line", 100.0)
            .with_range_action("pst", 0.0)
            .with_sensitivity("line", "pst", -10.0)
            .with_curvature("line", "pst", 1.0)
            .with_flow_shift("open-line", &[("line", 25.0)])
    }

    #[test]
    fn flow_follows_setpoint_and_curvature() {
        let mut net = network();
        let pst = RangeAction::hvdc("pst", "pst", -5.0, 5.0);
        RangeActionSetpoint { action: &pst, setpoint: 2.0 }.apply(&mut net).unwrap();

        // 100 - 10·2 + 1·4
        assert!((net.flow("line", &["pst"]) - 84.0).abs() < 1e-12);
        // -10 + 2·1·2
        assert!((net.local_sensitivity("line", "pst") + 6.0).abs() < 1e-12);
    }

    #[test]
    fn network_action_shifts_flow() {
        let mut net = network();
        NetworkAction::new("open-line").apply(&mut net).unwrap();
        assert!((net.flow("line", &["pst"]) - 125.0).abs() < 1e-12);
    }

    #[test]
    fn provider_reports_failed_states() {
        let effect = ActionEffect {
            failed_states: ["curative".to_string()].into_iter().collect(),
            ..ActionEffect::default()
        };
        let mut net = network().with_action_effect("bad", effect);
        NetworkAction::new("bad").apply(&mut net).unwrap();

        let cnecs = vec![
            FlowCnec::new("line", "preventive").with_symmetric_limit(200.0),
            FlowCnec::new("line-co", "curative").with_symmetric_limit(200.0),
        ];
        let provider = LinearSensitivityProvider::new();
        let out = provider.compute(&net, &cnecs, &[]);

        assert_eq!(out.sensitivities.status(), ComputationStatus::Default);
        assert_eq!(out.sensitivities.failed_states(), vec!["curative"]);
        assert!(out.flows.has_flow("line", Side::Left));
        assert!(!out.flows.has_flow("line-co", Side::Left));
        assert!(out.flows.flow(&cnecs[0], Side::Left, Unit::Ampere) > 100.0);
        assert_eq!(provider.computations(), 1);
    }

    #[test]
    fn unknown_range_action_is_rejected() {
        let mut net = network();
        let other = RangeAction::hvdc("other", "dc", -1.0, 1.0);
        assert!(net.apply_range_action_setpoint(&other, 0.5).is_err());
    }
}
