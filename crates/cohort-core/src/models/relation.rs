//! Relation domain model: a member resource bound to a group.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CohortError;

/// Kind of member resource a relation binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Thing,
    Channel,
    Profile,
}

impl MemberKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberKind::Thing => "thing",
            MemberKind::Channel => "channel",
            MemberKind::Profile => "profile",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberKind {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thing" => Ok(MemberKind::Thing),
            "channel" => Ok(MemberKind::Channel),
            "profile" => Ok(MemberKind::Profile),
            other => Err(CohortError::malformed(format!("unknown member kind: {other}"))),
        }
    }
}

/// How many groups a member of one kind may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationMode {
    /// A member belongs to at most one group.
    #[default]
    Exclusive,
    /// A member may belong to any number of groups.
    Shared,
}

/// Selects assigned or unassigned groups when listing a member's groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affiliation {
    #[default]
    Assigned,
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRelation {
    pub group_id: String,
    pub member_id: String,
    pub kind: MemberKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_kind_round_trips_through_str() {
        for kind in [MemberKind::Thing, MemberKind::Channel, MemberKind::Profile] {
            assert_eq!(kind.as_str().parse::<MemberKind>().unwrap(), kind);
        }
        assert!("device".parse::<MemberKind>().is_err());
    }
}
