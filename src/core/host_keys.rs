//! Collection of the server's public host keys advertised to clients.

use crate::constants;
use crate::error::ClientError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read every `*_key.pub` file under `dir`, keeping `<algorithm> <key>` of each.
///
/// Files are visited in path order. Empty files are skipped. At least one key
/// must be found.
pub fn collect_host_keys(dir: &Path) -> Result<Vec<String>, ClientError> {
    let pattern = host_key_pattern(dir);
    let paths = glob::glob(&pattern).map_err(|e| ClientError::InvalidConfiguration {
        name: "HOST_KEY_PATH".to_string(),
        reason: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(path) => debug!("skipping non-file {}", path.display()),
            Err(e) => debug!("skipping unreadable entry: {}", e),
        }
    }
    files.sort();

    let mut keys = Vec::new();
    for path in files {
        let content = fs::read_to_string(&path).map_err(|source| ClientError::HostKeyRead {
            path: path.clone(),
            source,
        })?;
        match strip_host_key(&content) {
            Some(key) => {
                debug!("host key {} from {}", key, path.display());
                keys.push(key);
            }
            None => debug!("skipping empty host key file {}", path.display()),
        }
    }

    if keys.is_empty() {
        return Err(ClientError::NoHostKeysFound { pattern });
    }
    Ok(keys)
}

/// Keep the first two whitespace-separated fields, dropping the comment.
pub fn strip_host_key(line: &str) -> Option<String> {
    let fields: Vec<&str> = line.split_whitespace().take(2).collect();
    if fields.is_empty() {
        return None;
    }
    Some(fields.join(" "))
}

fn host_key_pattern(dir: &Path) -> String {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let mut pattern = escaped.trim_end_matches('/').to_string();
    pattern.push('/');
    pattern.push_str(constants::HOST_KEY_GLOB);
    pattern
}
