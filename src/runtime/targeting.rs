//! Target selection for the drivers.

use std::cmp::Ordering;

use tracing::{debug, info};

use crate::core::{NodeDescriptor, SchedulerError, TargetOracle};

/// Pick the candidate whose required proficiency is closest to
/// `proficiency / divisor`, rounded down.
///
/// The home node, candidates the oracle does not know, and candidates with
/// no value are skipped. On equal distance the lower required level wins,
/// then snapshot order.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] for a zero divisor and
/// [`SchedulerError::TargetNotFound`] when no candidate qualifies.
pub fn select_target(
    oracle: &dyn TargetOracle,
    candidates: &[NodeDescriptor],
    home: &str,
    divisor: u32,
) -> Result<String, SchedulerError> {
    if divisor == 0 {
        return Err(SchedulerError::InvalidConfig(
            "target divisor must be greater than 0".into(),
        ));
    }
    let goal = oracle.proficiency() / divisor;

    let mut best: Option<(&str, u32, u32)> = None;
    for candidate in candidates {
        let id = candidate.id.as_str();
        if id == home {
            continue;
        }
        let (Ok(level), Ok(max_value)) =
            (oracle.required_proficiency(id), oracle.max_value(id))
        else {
            debug!(candidate = id, "not a known target");
            continue;
        };
        if max_value <= 0.0 {
            continue;
        }
        let distance = level.abs_diff(goal);
        let better = best.is_none_or(|(_, best_level, best_distance)| {
            match distance.cmp(&best_distance) {
                Ordering::Less => true,
                Ordering::Equal => level < best_level,
                Ordering::Greater => false,
            }
        });
        if better {
            best = Some((id, level, distance));
        }
    }

    let (id, level, _) =
        best.ok_or_else(|| SchedulerError::TargetNotFound("no eligible target".into()))?;
    info!(target = id, required = level, goal, "target selected");
    Ok(id.to_string())
}
