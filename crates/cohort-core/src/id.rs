//! Identifier generation and validation.

use uuid::Uuid;

/// Produces globally unique, opaque identifiers for new entities.
pub trait IdProvider: Send + Sync {
    fn id(&self) -> String;
}

/// Random (v4) UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Whether `id` has the identifier format stores accept.
pub fn is_valid_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}
