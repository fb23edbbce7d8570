//! Rounding of linear-problem setpoints to values the network accepts.
//!
//! PSTs go to one of the two taps surrounding the continuous angle, the one
//! with the better approximated minimum margin. Grouped PSTs move together.
//! Other range actions round to the nearest integer within their range.

use crate::fillers::FillerInput;
use rao_core::{Boundable, FlowCnec, RangeAction, RangeActionSetpoints, Side, Unit};
use std::collections::BTreeMap;

/// Margins closer than this are considered equal when picking a tap.
const TAP_MARGIN_TOLERANCE: f64 = 1e-6;

pub struct SetpointRounder<'a> {
    cnecs: &'a [FlowCnec],
    range_actions: &'a [RangeAction],
    pre_perimeter_setpoints: &'a RangeActionSetpoints,
    unit: Unit,
}

impl<'a> SetpointRounder<'a> {
    pub fn new(
        cnecs: &'a [FlowCnec],
        range_actions: &'a [RangeAction],
        pre_perimeter_setpoints: &'a RangeActionSetpoints,
        unit: Unit,
    ) -> Self {
        Self {
            cnecs,
            range_actions,
            pre_perimeter_setpoints,
            unit,
        }
    }

    /// Round `raw`, linearising flows around `reference`.
    pub fn round(&self, raw: &RangeActionSetpoints, reference: &FillerInput<'_>) -> RangeActionSetpoints {
        let raw_flows = self.approximate_flows(raw, reference);
        let mut rounded = RangeActionSetpoints::new();

        let mut pst_groups: BTreeMap<String, Vec<&RangeAction>> = BTreeMap::new();
        for ra in self.range_actions {
            let Some(value) = raw.get(&ra.id) else { continue };
            if ra.tap_table().is_some() {
                let key = ra.group_id.clone().unwrap_or_else(|| ra.id.clone());
                pst_groups.entry(key).or_default().push(ra);
            } else {
                rounded.set(&ra.id, self.round_to_integer(ra, value));
            }
        }

        for members in pst_groups.values() {
            if let Some(angle) = self.best_tap_angle(members, raw, &raw_flows, reference) {
                for ra in members {
                    rounded.set(&ra.id, angle);
                }
            }
        }
        rounded
    }

    fn admissible_range(&self, ra: &RangeAction) -> (f64, f64) {
        match self.pre_perimeter_setpoints.get(&ra.id) {
            Some(previous) => (ra.min_admissible_setpoint(previous), ra.max_admissible_setpoint(previous)),
            None => (ra.min_setpoint, ra.max_setpoint),
        }
    }

    fn round_to_integer(&self, ra: &RangeAction, value: f64) -> f64 {
        let (lb, ub) = self.admissible_range(ra);
        value.round().clamp(lb, ub)
    }

    /// Linearised MW flow of every element side at `setpoints`.
    fn approximate_flows(
        &self,
        setpoints: &RangeActionSetpoints,
        reference: &FillerInput<'_>,
    ) -> BTreeMap<(String, Side), f64> {
        let mut flows = BTreeMap::new();
        for cnec in self.cnecs.iter().filter(|c| c.optimized) {
            for side in cnec.monitored_sides() {
                let mut flow = reference.flows.flow(cnec, side, Unit::Megawatt);
                for ra in self.range_actions {
                    let (Some(target), Some(origin)) = (setpoints.get(&ra.id), reference.setpoints.get(&ra.id)) else {
                        continue;
                    };
                    flow += reference.sensitivities.sensitivity(&cnec.id, side, &ra.id) * (target - origin);
                }
                flows.insert((cnec.id.clone(), side), flow);
            }
        }
        flows
    }

    /// Pick between the taps surrounding the angle of the group leader.
    fn best_tap_angle(
        &self,
        members: &[&RangeAction],
        raw: &RangeActionSetpoints,
        raw_flows: &BTreeMap<(String, Side), f64>,
        reference: &FillerInput<'_>,
    ) -> Option<f64> {
        let leader = members.first()?;
        let table = leader.tap_table()?;
        let raw_angle = raw.get(&leader.id)?;
        let (lb, ub) = self.admissible_range(leader);

        let candidates: Vec<f64> = table
            .surrounding_taps(raw_angle)
            .into_iter()
            .filter_map(|tap| table.angle(tap))
            .filter(|angle| *angle >= lb - 1e-9 && *angle <= ub + 1e-9)
            .collect();
        let fallback = table
            .closest_tap(raw_angle.clamp(lb, ub))
            .and_then(|tap| table.angle(tap));

        let mut best: Option<(f64, f64)> = None;
        for angle in candidates {
            let margin = self.approximated_min_margin(members, angle, raw, raw_flows, reference);
            best = match best {
                None => Some((angle, margin)),
                Some((best_angle, best_margin)) => {
                    let better = margin > best_margin + TAP_MARGIN_TOLERANCE
                        || ((margin - best_margin).abs() <= TAP_MARGIN_TOLERANCE
                            && (angle - raw_angle).abs() < (best_angle - raw_angle).abs());
                    if better {
                        Some((angle, margin))
                    } else {
                        Some((best_angle, best_margin))
                    }
                }
            };
        }
        best.map(|(angle, _)| angle).or(fallback)
    }

    fn approximated_min_margin(
        &self,
        members: &[&RangeAction],
        angle: f64,
        raw: &RangeActionSetpoints,
        raw_flows: &BTreeMap<(String, Side), f64>,
        reference: &FillerInput<'_>,
    ) -> f64 {
        let mut min_margin = f64::INFINITY;
        for cnec in self.cnecs.iter().filter(|c| c.optimized) {
            for side in cnec.monitored_sides() {
                let Some(base) = raw_flows.get(&(cnec.id.clone(), side)) else { continue };
                let mut flow = *base;
                for ra in members {
                    if let Some(value) = raw.get(&ra.id) {
                        flow += reference.sensitivities.sensitivity(&cnec.id, side, &ra.id) * (angle - value);
                    }
                }
                let margin = cnec.compute_margin(flow * cnec.unit_multiplier(side, self.unit), side, self.unit);
                min_margin = min_margin.min(margin);
            }
        }
        min_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::test_support::snapshot;
    use rao_core::PstTapTable;

    fn setpoints(values: &[(&str, f64)]) -> RangeActionSetpoints {
        values.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn pst_goes_to_tap_with_better_margin() {
        let cnecs = vec![FlowCnec::new("line", "preventive").with_symmetric_limit(100.0)];
        let ras = vec![RangeAction::pst("pst", "pst", PstTapTable::linear(-5, 5, 1.0))];
        let (flows, sens) = snapshot(&cnecs, &[103.0], &[("line", "pst", -1.0)]);
        let origin = setpoints(&[("pst", 0.0)]);
        let reference = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &origin, iteration: 0 };
        let rounder = SetpointRounder::new(&cnecs, &ras, &origin, Unit::Megawatt);

        // 2.4 is closer to tap 2, but tap 3 relieves the line more
        let rounded = rounder.round(&setpoints(&[("pst", 2.4)]), &reference);
        assert_eq!(rounded.get("pst"), Some(3.0));
    }

    #[test]
    fn equal_margins_keep_closest_tap() {
        let cnecs = vec![FlowCnec::new("line", "preventive").with_symmetric_limit(100.0)];
        let ras = vec![RangeAction::pst("pst", "pst", PstTapTable::linear(-5, 5, 1.0))];
        let (flows, sens) = snapshot(&cnecs, &[50.0], &[]);
        let origin = setpoints(&[("pst", 0.0)]);
        let reference = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &origin, iteration: 0 };
        let rounder = SetpointRounder::new(&cnecs, &ras, &origin, Unit::Megawatt);
        assert_eq!(rounder.round(&setpoints(&[("pst", -1.3)]), &reference).get("pst"), Some(-1.0));
    }

    #[test]
    fn group_members_share_a_tap() {
        let cnecs = vec![FlowCnec::new("line", "preventive").with_symmetric_limit(100.0)];
        let ras = vec![
            RangeAction::pst("a", "pst-a", PstTapTable::linear(-5, 5, 1.0)).with_group("pair"),
            RangeAction::pst("b", "pst-b", PstTapTable::linear(-5, 5, 1.0)).with_group("pair"),
        ];
        let (flows, sens) = snapshot(&cnecs, &[110.0], &[("line", "a", -1.0), ("line", "b", -1.0)]);
        let origin = setpoints(&[("a", 0.0), ("b", 0.0)]);
        let reference = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &origin, iteration: 0 };
        let rounder = SetpointRounder::new(&cnecs, &ras, &origin, Unit::Megawatt);
        let rounded = rounder.round(&setpoints(&[("a", 2.6), ("b", 2.6)]), &reference);
        assert_eq!(rounded.get("a"), rounded.get("b"));
        assert_eq!(rounded.get("a"), Some(3.0));
    }

    #[test]
    fn continuous_actions_round_within_range() {
        let ras = vec![RangeAction::hvdc("dc", "dc", -10.5, 10.5)];
        let (flows, sens) = snapshot(&[], &[], &[]);
        let origin = setpoints(&[("dc", 0.0)]);
        let reference = FillerInput { flows: &flows, sensitivities: &sens, setpoints: &origin, iteration: 0 };
        let rounder = SetpointRounder::new(&[], &ras, &origin, Unit::Megawatt);
        assert_eq!(rounder.round(&setpoints(&[("dc", 3.6)]), &reference).get("dc"), Some(4.0));
        assert_eq!(rounder.round(&setpoints(&[("dc", 10.5)]), &reference).get("dc"), Some(10.5));
    }
}
