//! Group domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

/// A named container for member resources, scoped to an organization.
///
/// The name is unique within the organization. A group cannot be removed
/// while any relation, membership or invite still references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub org_id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub org_id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Mutable group fields. The id and organization never change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}
