use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Opaque identifier of a shareable item.
///
/// This is the only piece of an item that ever appears in a share link, so
/// it is generated from a random (v4) UUID and never derived from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = String, example = "3f8e2a4c-9b1d-4e7a-8c55-0d1f2e3a4b5c"))]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier received from a client.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|_| ValidationError::InvalidId(trimmed.to_owned()))
    }

    /// Return the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated lowercase, the same form `parse` accepts.
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ItemId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for ItemId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = ItemId::new();
        let b = ItemId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let id = ItemId::new();
        let parsed = ItemId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = ItemId::new();
        let parsed: ItemId = format!("  {id} ").parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            ItemId::parse("not-an-id"),
            Err(ValidationError::InvalidId(_))
        ));
        assert!(matches!(
            ItemId::parse("   "),
            Err(ValidationError::MissingField("id"))
        ));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ItemId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
