//! The credential store seam: registered clients and their usage counters.

use crate::error::ClientError;
use crate::models::record::ClientRecord;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Persistent shared store consulted by the SSH server.
///
/// Mutations must be atomic at the store: concurrent invocations of this tool
/// and the server's traffic accounting may race on the same keys.
pub trait CredentialStore {
    /// Register `identity` with `public_key`. Fails with `DuplicateClient` if
    /// the identity already has a record.
    fn add_record(&mut self, identity: &str, public_key: &str) -> Result<(), ClientError>;

    /// Drop every record of `identity`. Fails with `ClientNotFound` if none.
    fn remove_record(&mut self, identity: &str) -> Result<(), ClientError>;

    /// All current records, in no particular order.
    fn list_records(&mut self) -> Result<Vec<ClientRecord>, ClientError>;

    /// Current byte counter, zero if absent.
    fn get_usage(&mut self, identity: &str) -> Result<i64, ClientError>;

    /// Zero the counter by subtracting its current value; returns that value.
    fn reset_usage(&mut self, identity: &str) -> Result<i64, ClientError>;

    /// Force a durability checkpoint.
    fn persist(&mut self) -> Result<(), ClientError>;

    /// Liveness check.
    fn ping(&mut self) -> Result<(), ClientError>;
}

/// In-process store with the same semantics, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    members: BTreeSet<String>,
    usage: HashMap<String, i64>,
    mutations: usize,
    persists: usize,
    fail_persist: bool,
    fail_usage: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the accounting collaborator.
    pub fn add_usage(&mut self, identity: &str, bytes: i64) {
        *self.usage.entry(identity.to_string()).or_insert(0) += bytes;
    }

    /// Insert a raw member, bypassing the identity check (legacy data).
    pub fn insert_member(&mut self, member: &str) {
        self.members.insert(member.to_string());
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of mutating store commands applied so far.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    pub fn persists(&self) -> usize {
        self.persists
    }

    pub fn set_fail_persist(&mut self, fail: bool) {
        self.fail_persist = fail;
    }

    /// Make usage reads and resets for `identity` fail as a rejected command.
    pub fn set_fail_usage(&mut self, identity: &str) {
        self.fail_usage.insert(identity.to_string());
    }

    fn check_usage(&self, identity: &str) -> Result<(), ClientError> {
        if self.fail_usage.contains(identity) {
            return Err(ClientError::StoreCommand(format!(
                "usage unavailable for {}",
                identity
            )));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    fn add_record(&mut self, identity: &str, public_key: &str) -> Result<(), ClientError> {
        let prefix = ClientRecord::member_prefix(identity);
        if self.members.iter().any(|m| m.starts_with(&prefix)) {
            return Err(ClientError::DuplicateClient(identity.to_string()));
        }
        self.members
            .insert(ClientRecord::new(identity, public_key).member());
        self.mutations += 1;
        Ok(())
    }

    fn remove_record(&mut self, identity: &str) -> Result<(), ClientError> {
        let prefix = ClientRecord::member_prefix(identity);
        let before = self.members.len();
        self.members.retain(|m| !m.starts_with(&prefix));
        if self.members.len() == before {
            return Err(ClientError::ClientNotFound(identity.to_string()));
        }
        self.mutations += 1;
        Ok(())
    }

    fn list_records(&mut self) -> Result<Vec<ClientRecord>, ClientError> {
        Ok(self
            .members
            .iter()
            .map(|m| ClientRecord::from_member(m))
            .collect())
    }

    fn get_usage(&mut self, identity: &str) -> Result<i64, ClientError> {
        self.check_usage(identity)?;
        Ok(self.usage.get(identity).copied().unwrap_or(0))
    }

    fn reset_usage(&mut self, identity: &str) -> Result<i64, ClientError> {
        self.check_usage(identity)?;
        let value = self.usage.get(identity).copied().unwrap_or(0);
        if value != 0 {
            self.add_usage(identity, -value);
            self.mutations += 1;
        }
        Ok(value)
    }

    fn persist(&mut self) -> Result<(), ClientError> {
        if self.fail_persist {
            return Err(ClientError::StoreCommand("persist disabled".to_string()));
        }
        self.persists += 1;
        Ok(())
    }

    fn ping(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}
