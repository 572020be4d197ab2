//! Hash-chained JSON-lines trail of client lifecycle actions.
//!
//! Each line carries the SHA-256 of its own canonical JSON (without
//! `entry_hash`) and the hash of the line before it. Key material is never
//! recorded.

use crate::constants;
use crate::util::fs as client_fs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub client: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

fn detect_actor() -> String {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return format!("{}(sudo)", user);
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one entry. The file lock serializes concurrent writers.
    pub fn record(&self, action: &str, client: &str, error: Option<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            client_fs::ensure_dir(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("lock audit log {}", self.path.display()))?;

        file.seek(SeekFrom::Start(0)).context("rewind audit log")?;
        let prev_hash = last_entry_hash(BufReader::new(&file))?;

        let mut entry = AuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: detect_actor(),
            client: client.to_string(),
            success: error.is_none(),
            error,
            prev_hash,
            entry_hash: None,
        };
        entry.entry_hash = Some(compute_entry_hash(&entry)?);

        let line = serde_json::to_string(&entry).context("serialize audit entry")?;
        writeln!(file, "{}", line).context("write audit entry")?;
        file.flush().context("flush audit log")?;
        client_fs::set_permissions(&self.path, constants::AUDIT_LOG_MODE)
            .context("set audit log permissions")?;
        // lock released when `file` drops
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        let mut entries = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("read audit log line")?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str::<AuditEntry>(&line)
                .with_context(|| format!("parse audit entry on line {}", i + 1))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Walk the chain. Returns (entries checked, problems found).
    pub fn verify(&self) -> Result<(usize, Vec<String>)> {
        let entries = self.read()?;
        let mut errors = Vec::new();
        let mut prev: Option<String> = None;

        for (i, entry) in entries.iter().enumerate() {
            if entry.prev_hash != prev {
                errors.push(format!(
                    "entry {}: prev_hash mismatch (expected {:?}, got {:?})",
                    i + 1,
                    prev,
                    entry.prev_hash
                ));
            }
            match &entry.entry_hash {
                Some(stored) if *stored == compute_entry_hash(entry)? => {}
                Some(_) => errors.push(format!("entry {}: entry_hash mismatch (tampered?)", i + 1)),
                None => errors.push(format!("entry {}: missing entry_hash", i + 1)),
            }
            prev = entry.entry_hash.clone();
        }

        Ok((entries.len(), errors))
    }
}

fn last_entry_hash(reader: impl BufRead) -> Result<Option<String>> {
    let mut last = None;
    for line in reader.lines() {
        let line = line.context("read audit log line")?;
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }
    let Some(line) = last else {
        return Ok(None);
    };
    match serde_json::from_str::<AuditEntry>(&line) {
        Ok(AuditEntry {
            entry_hash: Some(hash),
            ..
        }) => Ok(Some(hash)),
        // chain onto whatever is there
        _ => Ok(Some(format!("{:064x}", Sha256::digest(line.as_bytes())))),
    }
}

/// SHA-256 over the entry JSON without `entry_hash`.
fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    // field order is fixed by the struct, so the text is stable across runs
    let canonical = serde_json::to_string(&value).context("serialize canonical json")?;
    Ok(format!("{:064x}", Sha256::digest(canonical.as_bytes())))
}
