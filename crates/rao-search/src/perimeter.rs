//! Perimeter of one optimization: the elements and actions of a state.

use rao_core::{
    Appliable, Boundable, ComputationStatus, FlowCnec, FlowResult, NetworkAction, NetworkState, RaoError,
    RaoResult, RangeAction, RangeActionSetpoint, RangeActionSetpoints, SensitivityProvider, SensitivityResult,
    UsageMethod,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    main_state: String,
    flow_cnecs: Vec<FlowCnec>,
    network_actions: Vec<Arc<NetworkAction>>,
    range_actions: Vec<RangeAction>,
}

impl OptimizationPerimeter {
    pub fn new(
        main_state: impl Into<String>,
        flow_cnecs: Vec<FlowCnec>,
        network_actions: Vec<NetworkAction>,
        range_actions: Vec<RangeAction>,
    ) -> RaoResult<Self> {
        let mut seen = BTreeSet::new();
        for id in network_actions.iter().map(|a| &a.id).chain(range_actions.iter().map(|a| &a.id)) {
            if !seen.insert(id.clone()) {
                return Err(RaoError::Validation(format!("remedial action id {} is used twice", id)));
            }
        }
        let mut cnec_ids = BTreeSet::new();
        for cnec in &flow_cnecs {
            if !cnec_ids.insert(cnec.id.clone()) {
                return Err(RaoError::Validation(format!("CNEC id {} is used twice", cnec.id)));
            }
        }
        Ok(Self {
            main_state: main_state.into(),
            flow_cnecs,
            network_actions: network_actions
                .into_iter()
                .filter(|a| a.usage_method != UsageMethod::Unavailable)
                .map(Arc::new)
                .collect(),
            range_actions: range_actions
                .into_iter()
                .filter(|a| a.usage_method != UsageMethod::Unavailable)
                .collect(),
        })
    }

    pub fn main_state(&self) -> &str {
        &self.main_state
    }

    pub fn flow_cnecs(&self) -> &[FlowCnec] {
        &self.flow_cnecs
    }

    /// Elements whose margin is maximized.
    pub fn optimized_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.flow_cnecs.iter().filter(|c| c.optimized)
    }

    pub fn monitored_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.flow_cnecs.iter().filter(|c| c.monitored)
    }

    pub fn loop_flow_cnecs(&self) -> impl Iterator<Item = &FlowCnec> {
        self.flow_cnecs.iter().filter(|c| c.loop_flow_threshold.is_some())
    }

    pub fn cnec(&self, id: &str) -> Option<&FlowCnec> {
        self.flow_cnecs.iter().find(|c| c.id == id)
    }

    pub fn network_actions(&self) -> &[Arc<NetworkAction>] {
        &self.network_actions
    }

    pub fn network_action(&self, id: &str) -> Option<&Arc<NetworkAction>> {
        self.network_actions.iter().find(|a| a.id == id)
    }

    pub fn range_actions(&self) -> &[RangeAction] {
        &self.range_actions
    }

    pub fn range_action(&self, id: &str) -> Option<&RangeAction> {
        self.range_actions.iter().find(|a| a.id == id)
    }

    /// Drop range actions whose pre-perimeter setpoint is outside their own range.
    ///
    /// Returns the ids removed.
    pub fn remove_range_actions_with_wrong_initial_setpoint(
        &mut self,
        pre_perimeter_setpoints: &RangeActionSetpoints,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        self.range_actions.retain(|ra| {
            let keep = match pre_perimeter_setpoints.get(&ra.id) {
                Some(setpoint) => ra.is_admissible(setpoint, setpoint),
                None => true,
            };
            if !keep {
                warn!(
                    range_action = %ra.id,
                    "range action has an initial setpoint outside its allowed range and is filtered out"
                );
                removed.push(ra.id.clone());
            }
            keep
        });
        removed
    }
}

/// Flows and setpoints of the network before the perimeter is optimized.
#[derive(Debug, Clone)]
pub struct PrePerimeterResult {
    pub flows: FlowResult,
    pub sensitivities: SensitivityResult,
    pub setpoints: RangeActionSetpoints,
    /// Flows at the very start of the RAO, the reference for MNECs and loop flows
    pub initial_flows: FlowResult,
}

impl PrePerimeterResult {
    /// Read setpoints from `network` and run one sensitivity computation.
    pub fn compute<N, P>(network: &N, perimeter: &OptimizationPerimeter, provider: &P) -> RaoResult<Self>
    where
        N: NetworkState,
        P: SensitivityProvider<N> + ?Sized,
    {
        let mut setpoints = RangeActionSetpoints::new();
        for ra in perimeter.range_actions() {
            setpoints.set(&ra.id, network.range_action_setpoint(ra)?);
        }
        let computation = provider.compute(network, perimeter.flow_cnecs(), perimeter.range_actions());
        if computation.sensitivities.status() == ComputationStatus::Failure {
            return Err(RaoError::Sensitivity(format!(
                "pre-perimeter sensitivity computation failed on {}",
                network.name()
            )));
        }
        Ok(Self {
            initial_flows: computation.flows.clone(),
            flows: computation.flows,
            sensitivities: computation.sensitivities,
            setpoints,
        })
    }

    pub fn with_initial_flows(mut self, initial_flows: FlowResult) -> Self {
        self.initial_flows = initial_flows;
        self
    }
}

/// Apply every setpoint of `setpoints` whose range action belongs to `range_actions`.
pub fn apply_setpoints<N: NetworkState>(
    network: &mut N,
    range_actions: &[RangeAction],
    setpoints: &RangeActionSetpoints,
) -> RaoResult<()> {
    for ra in range_actions {
        if let Some(setpoint) = setpoints.get(&ra.id) {
            RangeActionSetpoint { action: ra, setpoint }.apply(network)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::synthetic::{LinearNetwork, LinearSensitivityProvider};

    fn perimeter() -> OptimizationPerimeter {
        OptimizationPerimeter::new(
            "preventive",
            vec![
                FlowCnec::new("line", "preventive").with_symmetric_limit(100.0),
                FlowCnec::new("mnec", "preventive").with_symmetric_limit(100.0).monitored(false),
            ],
            vec![NetworkAction::new("open")],
            vec![RangeAction::hvdc("hvdc", "dc", -100.0, 100.0)],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_action_ids_are_rejected() {
        let result = OptimizationPerimeter::new(
            "preventive",
            vec![],
            vec![NetworkAction::new("x")],
            vec![RangeAction::hvdc("x", "dc", -1.0, 1.0)],
        );
        assert!(matches!(result, Err(RaoError::Validation(_))));
    }

    #[test]
    fn wrong_initial_setpoint_filters_range_action() {
        let mut perimeter = perimeter();
        let setpoints: RangeActionSetpoints = [("hvdc".to_string(), 150.0)].into_iter().collect();
        let removed = perimeter.remove_range_actions_with_wrong_initial_setpoint(&setpoints);
        assert_eq!(removed, vec!["hvdc"]);
        assert!(perimeter.range_actions().is_empty());
    }

    #[test]
    fn pre_perimeter_reads_setpoints_and_flows() {
        let perimeter = perimeter();
        let network = LinearNetwork::new("net").with_flow("line", 80.0).with_range_action("hvdc", 20.0);
        let result = PrePerimeterResult::compute(&network, &perimeter, &LinearSensitivityProvider::new()).unwrap();
        assert_eq!(result.setpoints.get("hvdc"), Some(20.0));
        assert_eq!(perimeter.monitored_cnecs().count(), 1);
        assert_eq!(perimeter.optimized_cnecs().count(), 1);
        assert!((result.flows.margin(&perimeter.flow_cnecs()[0], rao_core::Unit::Megawatt) - 20.0).abs() < 1e-9);
    }
}
