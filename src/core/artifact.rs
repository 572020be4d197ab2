//! Rendered client configurations on disk: `<config_path>/<uuid>.json`.

use crate::constants;
use crate::core::identity::ClientIdentity;
use crate::error::ClientError;
use crate::util::fs as client_fs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn artifact_path(config_dir: &Path, identity: &ClientIdentity) -> PathBuf {
    config_dir.join(format!("{}{}", identity, constants::ARTIFACT_EXTENSION))
}

/// Write the rendered configuration, creating the directory if needed.
pub fn write_artifact(
    config_dir: &Path,
    identity: &ClientIdentity,
    contents: &str,
) -> Result<PathBuf, ClientError> {
    let path = artifact_path(config_dir, identity);
    client_fs::ensure_dir(config_dir).map_err(|source| ClientError::Write {
        path: config_dir.to_path_buf(),
        source,
    })?;
    client_fs::write_atomic(&path, contents.as_bytes(), constants::ARTIFACT_FILE_MODE).map_err(
        |source| ClientError::Write {
            path: path.clone(),
            source,
        },
    )?;
    Ok(path)
}

pub fn remove_artifact(config_dir: &Path, identity: &ClientIdentity) -> io::Result<PathBuf> {
    let path = artifact_path(config_dir, identity);
    fs::remove_file(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id() -> ClientIdentity {
        ClientIdentity::parse("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap()
    }

    #[test]
    fn test_artifact_path() {
        assert_eq!(
            artifact_path(Path::new("/srv/configs"), &id()),
            PathBuf::from("/srv/configs/f47ac10b-58cc-4372-a567-0e02b2c3d479.json")
        );
    }

    #[test]
    fn test_write_then_remove() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("configs");
        let path = write_artifact(&config_dir, &id(), "{}").unwrap();
        assert!(path.is_file());
        remove_artifact(&config_dir, &id()).unwrap();
        assert!(!path.exists());
        assert!(remove_artifact(&config_dir, &id()).is_err());
    }
}
