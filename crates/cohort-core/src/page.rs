//! Page requests and paginated results shared by every listing operation.

use std::fmt;

use serde_json::Value;

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Filter, ordering and pagination for a listing.
///
/// Every field is optional. `limit == 0` means no limit.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Case-insensitive substring match on the entity name.
    pub name: Option<String>,
    /// Containment filter: matches entities whose metadata is a superset.
    /// Must be a JSON object.
    pub metadata: Option<Value>,
    /// Restricts results to these identifiers. An empty set yields an
    /// empty page.
    pub ids: Option<Vec<String>>,
    pub owner_id: Option<String>,
    pub org_id: Option<String>,
    /// Field to sort by; defaults to the identifier.
    pub order: Option<String>,
    pub dir: Option<Direction>,
    pub limit: u64,
    pub offset: u64,
}

impl PageRequest {
    pub fn with_limit(limit: u64, offset: u64) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }
}

/// A paginated result set. `total` counts the full filtered set.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> Page<T> {
    pub fn empty(offset: u64, limit: u64) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset,
            limit,
        }
    }
}
