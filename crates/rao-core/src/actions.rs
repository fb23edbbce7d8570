//! Remedial actions.
//!
//! Network actions are discrete (topology changes, fixed PST taps, fixed
//! injections); range actions are continuous setpoints optimized in the linear
//! problem. The set of kinds is closed: [`ElementaryAction`] and
//! [`RangeActionKind`] are plain enums, and behaviour that depends on the kind
//! is exposed through the narrow traits [`Appliable`], [`Boundable`] and
//! [`SensitivityHandled`].

use crate::error::{RaoError, RaoResult};
use crate::network::NetworkState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an action may be used in the optimized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMethod {
    #[default]
    Available,
    /// Applied unconditionally on the root leaf
    Forced,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Open,
    Close,
}

/// One atomic modification of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementaryAction {
    Topology { element: String, state: SwitchState },
    PstTap { element: String, tap: i32 },
    InjectionSetpoint { element: String, setpoint: f64 },
}

impl ElementaryAction {
    pub fn element(&self) -> &str {
        match self {
            ElementaryAction::Topology { element, .. }
            | ElementaryAction::PstTap { element, .. }
            | ElementaryAction::InjectionSetpoint { element, .. } => element,
        }
    }

    /// Two actions conflict when they drive the same element to different targets.
    pub fn is_compatible_with(&self, other: &ElementaryAction) -> bool {
        self.element() != other.element() || self == other
    }
}

/// A discrete remedial action made of one or more elementary actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub elementary_actions: Vec<ElementaryAction>,
    #[serde(default)]
    pub usage_method: UsageMethod,
}

impl NetworkAction {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            operator: None,
            elementary_actions: Vec::new(),
            usage_method: UsageMethod::Available,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_elementary_action(mut self, action: ElementaryAction) -> Self {
        self.elementary_actions.push(action);
        self
    }

    pub fn forced(mut self) -> Self {
        self.usage_method = UsageMethod::Forced;
        self
    }

    pub fn is_compatible_with(&self, other: &NetworkAction) -> bool {
        self.elementary_actions.iter().all(|mine| {
            other
                .elementary_actions
                .iter()
                .all(|theirs| mine.is_compatible_with(theirs))
        })
    }
}

/// Category of range action, used to look up per-kind parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionCategory {
    Pst,
    Hvdc,
    Injection,
}

impl fmt::Display for RangeActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeActionCategory::Pst => write!(f, "PST"),
            RangeActionCategory::Hvdc => write!(f, "HVDC"),
            RangeActionCategory::Injection => write!(f, "injection"),
        }
    }
}

/// One value per range-action category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerCategory<T> {
    pub pst: T,
    pub hvdc: T,
    pub injection: T,
}

impl<T: Copy> PerCategory<T> {
    pub fn get(&self, category: RangeActionCategory) -> T {
        match category {
            RangeActionCategory::Pst => self.pst,
            RangeActionCategory::Hvdc => self.hvdc,
            RangeActionCategory::Injection => self.injection,
        }
    }
}

/// Tap → angle table of a phase-shifting transformer, sorted by tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PstTapTable {
    pub taps: Vec<(i32, f64)>,
}

impl PstTapTable {
    pub fn new(mut taps: Vec<(i32, f64)>) -> Self {
        taps.sort_by_key(|(tap, _)| *tap);
        Self { taps }
    }

    /// Evenly spaced angles, `step` degrees per tap, centered on tap 0.
    pub fn linear(min_tap: i32, max_tap: i32, step: f64) -> Self {
        Self::new((min_tap..=max_tap).map(|t| (t, t as f64 * step)).collect())
    }

    pub fn angle(&self, tap: i32) -> Option<f64> {
        self.taps.iter().find(|(t, _)| *t == tap).map(|(_, a)| *a)
    }

    /// Tap whose angle is closest to `angle`.
    pub fn closest_tap(&self, angle: f64) -> Option<i32> {
        self.taps
            .iter()
            .min_by(|(_, a), (_, b)| (a - angle).abs().total_cmp(&(b - angle).abs()))
            .map(|(t, _)| *t)
    }

    /// The (at most two) taps whose angles surround `angle`.
    pub fn surrounding_taps(&self, angle: f64) -> Vec<i32> {
        let below = self
            .taps
            .iter()
            .filter(|(_, a)| *a <= angle + 1e-9)
            .max_by(|(_, a), (_, b)| a.total_cmp(b));
        let above = self
            .taps
            .iter()
            .filter(|(_, a)| *a >= angle - 1e-9)
            .min_by(|(_, a), (_, b)| a.total_cmp(b));
        let mut taps: Vec<i32> = below.into_iter().chain(above).map(|(t, _)| *t).collect();
        taps.sort();
        taps.dedup();
        taps
    }

    fn angle_range(&self) -> (f64, f64) {
        self.taps.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, a)| {
            (lo.min(*a), hi.max(*a))
        })
    }
}

/// Kind-specific data of a range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RangeActionKind {
    /// Setpoint is an angle in degrees, restricted to tap positions
    Pst { table: PstTapTable },
    /// Setpoint is an active power in MW
    Hvdc,
    /// Setpoint is an injection in MW
    Injection,
}

/// A continuous remedial action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub operator: Option<String>,
    pub network_element: String,
    pub kind: RangeActionKind,
    /// Absolute admissible range of the setpoint
    pub min_setpoint: f64,
    pub max_setpoint: f64,
    /// Optional range relative to the pre-perimeter setpoint
    #[serde(default)]
    pub relative_range: Option<(f64, f64)>,
    /// Range actions sharing a group id must take the same setpoint
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub usage_method: UsageMethod,
}

impl RangeAction {
    pub fn pst(id: impl Into<String>, element: impl Into<String>, table: PstTapTable) -> Self {
        let (min, max) = table.angle_range();
        Self::build(id.into(), element.into(), RangeActionKind::Pst { table }, min, max)
    }

    pub fn hvdc(id: impl Into<String>, element: impl Into<String>, min: f64, max: f64) -> Self {
        Self::build(id.into(), element.into(), RangeActionKind::Hvdc, min, max)
    }

    pub fn injection(id: impl Into<String>, element: impl Into<String>, min: f64, max: f64) -> Self {
        Self::build(id.into(), element.into(), RangeActionKind::Injection, min, max)
    }

    fn build(id: String, element: String, kind: RangeActionKind, min: f64, max: f64) -> Self {
        Self {
            name: id.clone(),
            id,
            operator: None,
            network_element: element,
            kind,
            min_setpoint: min,
            max_setpoint: max,
            relative_range: None,
            group_id: None,
            usage_method: UsageMethod::Available,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_relative_range(mut self, min_delta: f64, max_delta: f64) -> Self {
        self.relative_range = Some((min_delta, max_delta));
        self
    }

    pub fn tap_table(&self) -> Option<&PstTapTable> {
        match &self.kind {
            RangeActionKind::Pst { table } => Some(table),
            _ => None,
        }
    }
}

/// Something that can be applied to a network state.
pub trait Appliable {
    fn apply<N: NetworkState>(&self, network: &mut N) -> RaoResult<()>;
}

impl Appliable for NetworkAction {
    fn apply<N: NetworkState>(&self, network: &mut N) -> RaoResult<()> {
        network.apply_network_action(self)
    }
}

/// A range action paired with the setpoint to apply.
#[derive(Debug, Clone, Copy)]
pub struct RangeActionSetpoint<'a> {
    pub action: &'a RangeAction,
    pub setpoint: f64,
}

impl Appliable for RangeActionSetpoint<'_> {
    fn apply<N: NetworkState>(&self, network: &mut N) -> RaoResult<()> {
        let action = self.action;
        let (min, max) = (action.min_setpoint, action.max_setpoint);
        if self.setpoint < min - 1e-6 || self.setpoint > max + 1e-6 {
            return Err(RaoError::Network(format!(
                "setpoint {:.3} of range action {} outside [{:.3}, {:.3}]",
                self.setpoint, action.id, min, max
            )));
        }
        network.apply_range_action_setpoint(action, self.setpoint)
    }
}

/// Admissible setpoint range given the setpoint of the previous instant.
pub trait Boundable {
    fn min_admissible_setpoint(&self, previous: f64) -> f64;
    fn max_admissible_setpoint(&self, previous: f64) -> f64;

    fn is_admissible(&self, setpoint: f64, previous: f64) -> bool {
        setpoint >= self.min_admissible_setpoint(previous) - 1e-6
            && setpoint <= self.max_admissible_setpoint(previous) + 1e-6
    }
}

impl Boundable for RangeAction {
    fn min_admissible_setpoint(&self, previous: f64) -> f64 {
        match self.relative_range {
            Some((min_delta, _)) => self.min_setpoint.max(previous + min_delta),
            None => self.min_setpoint,
        }
    }

    fn max_admissible_setpoint(&self, previous: f64) -> f64 {
        match self.relative_range {
            Some((_, max_delta)) => self.max_setpoint.min(previous + max_delta),
            None => self.max_setpoint,
        }
    }
}

/// What a sensitivity coefficient of this action is expressed against.
pub trait SensitivityHandled {
    fn category(&self) -> RangeActionCategory;

    /// Unit of the setpoint the sensitivity is a derivative against
    fn setpoint_unit(&self) -> &'static str {
        match self.category() {
            RangeActionCategory::Pst => "°",
            RangeActionCategory::Hvdc | RangeActionCategory::Injection => "MW",
        }
    }

    /// Whether a sensitivity of this magnitude is worth keeping in the model.
    fn is_significant(&self, sensitivity: f64, thresholds: &PerCategory<f64>) -> bool {
        sensitivity.abs() >= thresholds.get(self.category())
    }
}

impl SensitivityHandled for RangeAction {
    fn category(&self) -> RangeActionCategory {
        match self.kind {
            RangeActionKind::Pst { .. } => RangeActionCategory::Pst,
            RangeActionKind::Hvdc => RangeActionCategory::Hvdc,
            RangeActionKind::Injection => RangeActionCategory::Injection,
        }
    }
}
