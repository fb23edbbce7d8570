//! Naming scheme of linear problem variables and constraints.
//!
//! Fillers find each other's variables through these names, so every filler
//! must build names with the functions below.

use rao_core::Side;

/// Which limit a margin-type constraint protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginExtension {
    /// Constraint built on the lower limit
    BelowThreshold,
    /// Constraint built on the upper limit
    AboveThreshold,
}

impl MarginExtension {
    fn suffix(&self) -> &'static str {
        match self {
            MarginExtension::BelowThreshold => "below_threshold",
            MarginExtension::AboveThreshold => "above_threshold",
        }
    }
}

pub const MIN_MARGIN: &str = "min_margin";
pub const MIN_RELATIVE_MARGIN: &str = "min_relative_margin";
pub const MIN_RELATIVE_MARGIN_SIGN: &str = "min_relative_margin_sign";
pub const MIN_RELATIVE_MARGIN_SIGN_DEFINITION: &str = "min_relative_margin_sign_definition";
pub const MIN_RELATIVE_MARGIN_SET_TO_ZERO: &str = "min_relative_margin_set_to_zero";

pub fn setpoint(range_action_id: &str) -> String {
    format!("setpoint_{}", range_action_id)
}

pub fn absolute_variation(range_action_id: &str) -> String {
    format!("absolute_variation_{}", range_action_id)
}

pub fn absolute_variation_constraint(range_action_id: &str, positive: bool) -> String {
    let sign = if positive { "positive" } else { "negative" };
    format!("absolute_variation_{}_{}", range_action_id, sign)
}

pub fn range_shrink(range_action_id: &str) -> String {
    format!("range_shrink_{}", range_action_id)
}

pub fn flow(cnec_id: &str, side: Side) -> String {
    format!("flow_{}_{}", cnec_id, side)
}

pub fn flow_constraint(cnec_id: &str, side: Side) -> String {
    format!("flow_definition_{}_{}", cnec_id, side)
}

pub fn min_margin_constraint(cnec_id: &str, side: Side, extension: MarginExtension) -> String {
    format!("min_margin_{}_{}_{}", cnec_id, side, extension.suffix())
}

pub fn min_relative_margin_constraint(cnec_id: &str, side: Side, extension: MarginExtension) -> String {
    format!("min_relative_margin_{}_{}_{}", cnec_id, side, extension.suffix())
}

pub fn mnec_violation(cnec_id: &str, side: Side) -> String {
    format!("mnec_violation_{}_{}", cnec_id, side)
}

pub fn mnec_flow_constraint(cnec_id: &str, side: Side, extension: MarginExtension) -> String {
    format!("mnec_flow_{}_{}_{}", cnec_id, side, extension.suffix())
}

pub fn loop_flow_violation(cnec_id: &str, side: Side) -> String {
    format!("loop_flow_violation_{}_{}", cnec_id, side)
}

pub fn loop_flow_constraint(cnec_id: &str, side: Side, extension: MarginExtension) -> String {
    format!("loop_flow_{}_{}_{}", cnec_id, side, extension.suffix())
}

pub fn optimize_cnec(cnec_id: &str, side: Side) -> String {
    format!("optimize_cnec_{}_{}", cnec_id, side)
}

pub fn dont_optimize_cnec_constraint(cnec_id: &str, side: Side, extension: MarginExtension) -> String {
    format!("dont_optimize_cnec_{}_{}_{}", cnec_id, side, extension.suffix())
}

pub fn group_setpoint(group_id: &str) -> String {
    format!("group_setpoint_{}", group_id)
}

pub fn group_member_constraint(range_action_id: &str, group_id: &str) -> String {
    format!("group_member_{}_{}", range_action_id, group_id)
}
