//! Error kinds surfaced by the client lifecycle core.

use std::io;
use std::path::PathBuf;

/// Failures of core lifecycle operations, one variant per kind.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Identifier is not a canonical lowercase version-4 uuid.
    #[error("invalid client identifier '{0}' (expected a lowercase UUIDv4)")]
    InvalidIdentifier(String),

    /// A required configuration variable was not provided.
    #[error("required variable not found: {0} (pass the flag or set it in the environment)")]
    MissingConfiguration(String),

    /// A configuration variable was provided but is unusable.
    #[error("invalid value for {name}: {reason}")]
    InvalidConfiguration { name: String, reason: String },

    /// No `*_key.pub` file yielded a host key.
    #[error("no host keys found matching {pattern}")]
    NoHostKeysFound { pattern: String },

    /// A host key file exists but could not be read.
    #[error("read host key {path}: {source}")]
    HostKeyRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The template file could not be read.
    #[error("template not found: {path}: {source}")]
    TemplateNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The template contains a malformed placeholder.
    #[error("template parse error at byte {offset}: {reason}")]
    TemplateParse { offset: usize, reason: String },

    /// The template references a variable that was not supplied.
    #[error("template placeholder has no value: {0}")]
    UnboundPlaceholder(String),

    /// Key generation or key encoding failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The identity is already registered in the store.
    #[error("client already registered: {0}")]
    DuplicateClient(String),

    /// No record exists for the identity.
    #[error("cannot find the specified client: {0}")]
    ClientNotFound(String),

    /// The store could not be reached or timed out.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered but rejected the command.
    #[error("credential store command failed: {0}")]
    StoreCommand(String),

    /// Writing a file on disk failed.
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ClientError {
    /// Short stable tag used in user-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::InvalidIdentifier(_) => "invalid-identifier",
            ClientError::MissingConfiguration(_) => "missing-configuration",
            ClientError::InvalidConfiguration { .. } => "invalid-configuration",
            ClientError::NoHostKeysFound { .. } => "no-host-keys",
            ClientError::HostKeyRead { .. } => "host-key-read",
            ClientError::TemplateNotFound { .. } => "template-not-found",
            ClientError::TemplateParse { .. } => "template-parse",
            ClientError::UnboundPlaceholder(_) => "template-parse",
            ClientError::KeyGeneration(_) => "key-generation",
            ClientError::DuplicateClient(_) => "duplicate-client",
            ClientError::ClientNotFound(_) => "client-not-found",
            ClientError::StoreUnavailable(_) => "store-unavailable",
            ClientError::StoreCommand(_) => "store-command",
            ClientError::Write { .. } => "write",
        }
    }

    /// Process exit code for this kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            ClientError::InvalidIdentifier(_) => 2,
            ClientError::MissingConfiguration(_) | ClientError::InvalidConfiguration { .. } => 3,
            ClientError::NoHostKeysFound { .. } | ClientError::HostKeyRead { .. } => 4,
            ClientError::TemplateNotFound { .. }
            | ClientError::TemplateParse { .. }
            | ClientError::UnboundPlaceholder(_) => 5,
            ClientError::KeyGeneration(_) => 6,
            ClientError::DuplicateClient(_) => 7,
            ClientError::ClientNotFound(_) => 8,
            ClientError::StoreUnavailable(_) | ClientError::StoreCommand(_) => 9,
            ClientError::Write { .. } => 10,
        }
    }
}
