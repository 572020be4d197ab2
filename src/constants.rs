//! Centralized constants for store keys, paths, and limits.

/// Redis set holding `<uuid>::<public key>` members of registered clients.
pub const USERS_SET: &str = "ssh-server:users";

/// Redis hash mapping client uuid to transferred bytes.
pub const USERS_USAGE: &str = "ssh-server:users-usage";

/// Separator between identity and public key in a client record.
pub const RECORD_SEPARATOR: &str = "::";

/// Default directory for rendered client configurations.
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/ssh-client-gen/configs";

/// File extension for rendered client configurations.
pub const ARTIFACT_EXTENSION: &str = ".json";

/// Permission mode for rendered client configurations (contain a private key).
pub const ARTIFACT_FILE_MODE: u32 = 0o640;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// Glob matched against the host key directory.
pub const HOST_KEY_GLOB: &str = "*_key.pub";

/// Placeholder substituted with the client uuid in `host_addr`.
pub const HOST_ADDR_PLACEHOLDER: &str = "{uuid}";

/// Default timeout for every store round trip, in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

/// Bytes per reported megabyte (decimal, as printed in usage reports).
pub const BYTES_PER_MB: f64 = 1e6;
