//! Client identifiers: canonical lowercase version-4 uuids.

use crate::error::ClientError;
use std::fmt;
use std::str::FromStr;
use uuid::{Uuid, Variant, Version};

/// A validated client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientIdentity(Uuid);

impl ClientIdentity {
    /// Draw a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied identifier, accepting only the canonical form.
    pub fn parse(candidate: &str) -> Result<Self, ClientError> {
        let uuid = Uuid::parse_str(candidate)
            .map_err(|_| ClientError::InvalidIdentifier(candidate.to_string()))?;
        if uuid.get_version() != Some(Version::Random) || uuid.get_variant() != Variant::RFC4122 {
            return Err(ClientError::InvalidIdentifier(candidate.to_string()));
        }
        // Rejects uppercase, braces, urn: and unhyphenated spellings.
        if uuid.hyphenated().to_string() != candidate {
            return Err(ClientError::InvalidIdentifier(candidate.to_string()));
        }
        Ok(Self(uuid))
    }
}

/// True iff `candidate` is exactly the canonical text of a version-4 uuid.
pub fn validate(candidate: &str) -> bool {
    ClientIdentity::parse(candidate).is_ok()
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ClientIdentity {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
