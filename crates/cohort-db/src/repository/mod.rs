//! SurrealDB repository implementations.

mod group;
mod invite;
mod membership;
mod relation;

use cohort_core::error::{CohortError, CohortResult};
use cohort_core::id::is_valid_id;

pub use group::SurrealGroupRepository;
pub use invite::SurrealInviteRepository;
pub use membership::SurrealMembershipRepository;
pub use relation::SurrealRelationRepository;

/// Reject identifiers the stores would never have issued.
fn ensure_id(what: &str, id: &str) -> CohortResult<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(CohortError::malformed(format!("invalid {what}: {id:?}")))
    }
}

fn ensure_ids(what: &str, ids: &[String]) -> CohortResult<()> {
    ids.iter().try_for_each(|id| ensure_id(what, id))
}
