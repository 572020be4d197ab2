use crate::constants::RECORD_SEPARATOR;
use serde::Serialize;

/// A registered client as stored: `<identity>::<public key>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ClientRecord {
    pub identity: String,
    pub public_key: String,
}

impl ClientRecord {
    pub fn new(identity: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            public_key: public_key.into(),
        }
    }

    /// The composite set member.
    pub fn member(&self) -> String {
        format!("{}{}{}", self.identity, RECORD_SEPARATOR, self.public_key)
    }

    /// Split a set member; a member without separator is all identity.
    pub fn from_member(member: &str) -> Self {
        match member.split_once(RECORD_SEPARATOR) {
            Some((identity, public_key)) => Self::new(identity, public_key),
            None => Self::new(member, ""),
        }
    }

    /// Prefix matching every member belonging to `identity`.
    pub fn member_prefix(identity: &str) -> String {
        format!("{}{}", identity, RECORD_SEPARATOR)
    }
}
