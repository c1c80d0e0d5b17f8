//! Deterministic step selection.

use crate::core::catalogue::StepDescriptor;
use crate::core::conditions::ConditionSet;

/// Steps that could run now, in catalogue order.
///
/// A step is eligible when all its preconditions hold and it is not already
/// done: steps whose postconditions are all satisfied are dropped unless they
/// are rerun-eligible.
pub fn eligible_steps<'a>(
    catalogue: &'a [StepDescriptor],
    conditions: &ConditionSet,
) -> Vec<&'a StepDescriptor> {
    catalogue
        .iter()
        .filter(|step| step.preconditions_hold(conditions))
        .filter(|step| step.can_rerun || !step.postconditions_satisfied(conditions))
        .collect()
}

/// Pick the cheapest eligible step; ties go to the earliest catalogue entry.
///
/// Returns `None` when no step is eligible.
pub fn select_step<'a>(
    catalogue: &'a [StepDescriptor],
    conditions: &ConditionSet,
) -> Option<&'a StepDescriptor> {
    eligible_steps(catalogue, conditions)
        .into_iter()
        .enumerate()
        .min_by_key(|(index, step)| (step.cost, *index))
        .map(|(_, step)| step)
}
