//! Group invite domain model and the dormant invite bridge.
//!
//! An invite created without an invitee is *dormant*: it waits for a
//! parent organization invite to be accepted, at which point every dormant
//! invite linked to it is bound to the accepting user in one transaction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::membership::Role;
use crate::error::CohortError;

/// Stored invite state. `Expired` is never written; it is derived from
/// `expires_at` whenever an invite is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteState {
    Pending,
    Active,
    Expired,
}

impl InviteState {
    pub fn as_str(self) -> &'static str {
        match self {
            InviteState::Pending => "Pending",
            InviteState::Active => "Active",
            InviteState::Expired => "Expired",
        }
    }
}

impl fmt::Display for InviteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteState {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(InviteState::Pending),
            "Active" => Ok(InviteState::Active),
            "Expired" => Ok(InviteState::Expired),
            other => Err(CohortError::malformed(format!("unknown invite state: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    /// `None` while the invite is dormant.
    pub invitee_id: Option<String>,
    pub inviter_id: String,
    pub group_id: String,
    pub invitee_role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: InviteState,
}

impl Invite {
    pub fn is_dormant(&self) -> bool {
        self.invitee_id.is_none()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// State as observed at `now`: any invite past its expiry is expired,
    /// whatever was stored.
    pub fn state_at(&self, now: DateTime<Utc>) -> InviteState {
        if self.is_expired_at(now) {
            InviteState::Expired
        } else {
            self.state
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvite {
    /// Leave empty to create a dormant invite.
    pub invitee_id: Option<String>,
    pub inviter_id: String,
    pub group_id: String,
    pub invitee_role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Which side of an invite a user listing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteParty {
    Inviter,
    Invitee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DormantInviteLink {
    pub org_invite_id: String,
    pub group_invite_id: String,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn invite(expires_at: DateTime<Utc>, state: InviteState) -> Invite {
        Invite {
            id: "i".into(),
            invitee_id: None,
            inviter_id: "u".into(),
            group_id: "g".into(),
            invitee_role: Role::Viewer,
            created_at: Utc::now(),
            expires_at,
            state,
        }
    }

    #[test]
    fn expiry_overrides_stored_state() {
        let now = Utc::now();
        let past = invite(now - Duration::minutes(1), InviteState::Active);
        assert_eq!(past.state_at(now), InviteState::Expired);

        let future = invite(now + Duration::hours(1), InviteState::Pending);
        assert_eq!(future.state_at(now), InviteState::Pending);
        assert!(future.is_dormant());
    }
}
