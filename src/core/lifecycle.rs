//! Status gates for tenders and bids.
//!
//! Status writes are authorized writes, not a hard-coded transition table: under
//! [`TransitionPolicy::Permissive`] any authorized write goes through. Operations
//! that depend on status (bid creation, decisions, feedback) check it here.

use crate::core::error::TenderError;
use crate::core::model::{Coordination, Status};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any status may be written by an authorized principal.
    #[default]
    Permissive,
    /// Only `Created -> Published` and `Published -> Closed`.
    Strict,
}

/// Check a requested status write against the configured policy.
/// Writing the current status again is always allowed.
pub fn check_transition(
    policy: TransitionPolicy,
    entity: &str,
    from: Status,
    to: Status,
) -> Result<(), TenderError> {
    if from == to || policy == TransitionPolicy::Permissive {
        return Ok(());
    }
    match (from, to) {
        (Status::Created, Status::Published) | (Status::Published, Status::Closed) => Ok(()),
        _ => Err(TenderError::PreconditionFailed(format!(
            "{} cannot move from {} to {}",
            entity, from, to
        ))),
    }
}

pub fn require_published(entity: &str, id: &str, status: Status) -> Result<(), TenderError> {
    if status != Status::Published {
        return Err(TenderError::PreconditionFailed(format!(
            "{} '{}' is {}, not Published",
            entity, id, status
        )));
    }
    Ok(())
}

/// Bids close only through the decision protocol, so a manual status write may
/// neither close a bid nor reopen a closed one.
pub fn check_bid_status_write(
    policy: TransitionPolicy,
    bid_id: &str,
    from: Status,
    to: Status,
) -> Result<(), TenderError> {
    if to == Status::Closed && from != Status::Closed {
        return Err(TenderError::PreconditionFailed(format!(
            "bid '{}' can only be closed by a decision",
            bid_id
        )));
    }
    if from == Status::Closed && to != Status::Closed {
        return Err(TenderError::PreconditionFailed(format!(
            "bid '{}' is Closed",
            bid_id
        )));
    }
    check_transition(policy, "bid", from, to)
}

/// Status a bid must carry for a given coordination outcome.
pub fn status_for(coordination: Coordination) -> Status {
    if coordination.is_terminal() {
        Status::Closed
    } else {
        Status::Published
    }
}
