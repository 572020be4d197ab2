//! Client lifecycle: add, remove, list, usage report and reset.

use crate::constants;
use crate::core::artifact;
use crate::core::audit::AuditLog;
use crate::core::credstore::CredentialStore;
use crate::core::host_keys;
use crate::core::identity::ClientIdentity;
use crate::core::keypair;
use crate::core::settings::Settings;
use crate::core::template::{self, Template};
use crate::error::ClientError;
use crate::models::report::{self, ClientListing, ResetOutcome, UsageOutcome, UsageResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Which clients a usage report or reset applies to.
#[derive(Debug, Clone)]
pub enum Selection {
    All,
    Only(Vec<String>),
}

/// Display address: `host_addr` with `{uuid}` replaced by the identity.
pub fn client_address(host_addr: &str, identity: &str) -> String {
    host_addr.replace(constants::HOST_ADDR_PLACEHOLDER, identity)
}

/// Orchestrates store, keys, templates and artifacts for one invocation.
pub struct ClientManager<'a, S: CredentialStore + ?Sized> {
    store: &'a mut S,
    config_dir: PathBuf,
    audit: Option<AuditLog>,
}

impl<'a, S: CredentialStore + ?Sized> ClientManager<'a, S> {
    pub fn new(store: &'a mut S, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            config_dir: config_dir.into(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Option<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Provision one client and return its identity.
    ///
    /// `requested` must be a canonical UUIDv4; `None` draws a fresh one. The
    /// configuration is rendered before the store is touched. If the artifact
    /// cannot be written after registration, the record is removed again.
    pub fn generate(
        &mut self,
        requested: Option<&str>,
        settings: &Settings,
    ) -> Result<ClientIdentity, ClientError> {
        let identity = match requested {
            Some(candidate) => ClientIdentity::parse(candidate)?,
            None => ClientIdentity::generate(),
        };
        let result = self.provision(&identity, settings);
        self.audit("add", &identity.to_string(), &result);
        result.map(|path| {
            info!("added client {} ({})", identity, path.display());
            identity
        })
    }

    fn provision(
        &mut self,
        identity: &ClientIdentity,
        settings: &Settings,
    ) -> Result<PathBuf, ClientError> {
        let provisioning = settings.provisioning()?;
        let host_keys = host_keys::collect_host_keys(&provisioning.host_key_path)?;
        let template = Template::load(&provisioning.template_path)?;

        let keypair = keypair::generate_keypair()?;
        let private_key = keypair::serialize_private(&keypair)?;
        let public_key = keypair::serialize_public(&keypair)?;

        let id = identity.to_string();
        let rendered = {
            let mut vars: BTreeMap<&str, String> = BTreeMap::new();
            vars.insert(template::SERVER_ADDR, provisioning.server_addr.clone());
            vars.insert(template::SERVER_PORT, provisioning.server_port.to_string());
            vars.insert(template::CLIENT_UUID, id.clone());
            vars.insert(
                template::PRIVATE_KEY,
                Value::String(private_key.to_string()).to_string(),
            );
            vars.insert(template::HOST_KEYS, Value::from(host_keys).to_string());
            let rendered = Zeroizing::new(template.render(&vars)?);
            if let Some(encoded) = vars.get_mut(template::PRIVATE_KEY) {
                zeroize::Zeroize::zeroize(encoded);
            }
            rendered
        };

        self.store.add_record(&id, &public_key)?;

        let path = match artifact::write_artifact(&self.config_dir, identity, &rendered) {
            Ok(path) => path,
            Err(err) => {
                match self.store.remove_record(&id) {
                    Ok(()) => debug!("rolled back record for {}", id),
                    Err(e) => warn!("orphaned store record for {}: {}", id, e),
                }
                return Err(err);
            }
        };

        self.persist();
        Ok(path)
    }

    /// Remove a client's record, then its configuration file.
    ///
    /// A missing or undeletable file is logged and does not fail the call.
    pub fn remove(&mut self, candidate: &str) -> Result<(), ClientError> {
        let identity = ClientIdentity::parse(candidate)?;
        let result = self.store.remove_record(&identity.to_string());
        self.audit("remove", candidate, &result);
        result?;
        self.persist();

        match artifact::remove_artifact(&self.config_dir, &identity) {
            Ok(path) => debug!("deleted {}", path.display()),
            Err(e) => warn!(
                "could not delete the configuration file for {}: {}",
                identity, e
            ),
        }
        info!("removed client {}", identity);
        Ok(())
    }

    /// Every registered client, sorted by identity.
    pub fn list(
        &mut self,
        host_addr: &str,
        with_usage: bool,
    ) -> Result<Vec<ClientListing>, ClientError> {
        let mut records = self.store.list_records()?;
        records.sort();
        let mut listings = Vec::with_capacity(records.len());
        for record in records {
            let usage_bytes = if with_usage {
                Some(self.store.get_usage(&record.identity)?)
            } else {
                None
            };
            listings.push(ClientListing {
                address: client_address(host_addr, &record.identity),
                fingerprint: keypair::fingerprint(&record.public_key),
                identity: record.identity,
                public_key: record.public_key,
                usage_bytes,
            });
        }
        Ok(listings)
    }

    /// Read (and with `reset`, zero) usage for the selected clients.
    ///
    /// Each requested identifier gets its own outcome: invalid identifiers and
    /// per-client store failures are reported without aborting the batch.
    /// Enumerating all clients is the only step whose failure is fatal.
    pub fn usage(
        &mut self,
        selection: &Selection,
        reset: bool,
    ) -> Result<Vec<UsageOutcome>, ClientError> {
        let candidates: Vec<String> = match selection {
            Selection::All => {
                let mut ids: Vec<String> = self
                    .store
                    .list_records()?
                    .into_iter()
                    .map(|r| r.identity)
                    .collect();
                ids.sort();
                ids.dedup();
                ids
            }
            Selection::Only(ids) => ids.clone(),
        };

        let mut outcomes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = ClientIdentity::parse(&candidate).and_then(|identity| {
                let id = identity.to_string();
                if reset {
                    self.store.reset_usage(&id)
                } else {
                    self.store.get_usage(&id)
                }
            });
            if reset {
                self.audit("reset", &candidate, &result);
            }
            let result = match result {
                Ok(bytes) => UsageResult::Ok { bytes },
                Err(e) => {
                    warn!("usage for {}: {}", candidate, e);
                    UsageResult::Failed {
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(UsageOutcome {
                identity: candidate,
                result,
            });
        }

        report::sort_by_usage_desc(&mut outcomes);
        Ok(outcomes)
    }

    /// Zero every client's usage once `confirm` approves. Declining touches
    /// nothing.
    pub fn reset_all(
        &mut self,
        confirm: impl FnOnce() -> bool,
    ) -> Result<ResetOutcome, ClientError> {
        if !confirm() {
            info!("bulk usage reset declined");
            return Ok(ResetOutcome::Declined);
        }
        self.usage(&Selection::All, true).map(ResetOutcome::Reset)
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.persist() {
            warn!("store persist failed (changes are applied but may not be on disk): {}", e);
        }
    }

    fn audit<T>(&self, action: &str, client: &str, result: &Result<T, ClientError>) {
        let Some(log) = &self.audit else {
            return;
        };
        let error = result.as_ref().err().map(|e| e.kind().to_string());
        if let Err(e) = log.record(action, client, error) {
            warn!("audit log failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credstore::MemoryStore;
    use crate::core::settings::{self, Settings};
    use std::fs;
    use tempfile::TempDir;

    const ID: &str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";
    const OTHER: &str = "9b2e6b1c-3f4d-4a5e-8b6c-7d8e9f0a1b2c";

    const FULL_TEMPLATE: &str = r#"{"server":"${server_addr}","port":${server_port},"uuid":"${client_uuid}","key":${private_key},"host_keys":${host_keys}}"#;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new(template: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let keys = dir.path().join("keys");
            fs::create_dir_all(&keys).unwrap();
            fs::write(
                keys.join("ssh_host_ed25519_key.pub"),
                "ssh-ed25519 AAAAC3Nz host1\n",
            )
            .unwrap();
            fs::write(keys.join("ssh_host_rsa_key.pub"), "ssh-rsa AAAAB3Nz host2\n").unwrap();
            fs::write(dir.path().join("template.json"), template).unwrap();
            Self { dir }
        }

        fn config_dir(&self) -> PathBuf {
            self.dir.path().join("configs")
        }

        fn settings(&self) -> Settings {
            Settings::with_lookup(|_| None)
                .flag(settings::SERVER_ADDR, Some("vpn.example.org".into()))
                .flag(settings::SERVER_PORT, Some("51820".into()))
                .flag(
                    settings::HOST_KEY_PATH,
                    Some(self.dir.path().join("keys").display().to_string()),
                )
                .flag(
                    settings::TEMPLATE_PATH,
                    Some(self.dir.path().join("template.json").display().to_string()),
                )
        }
    }

    #[test]
    fn test_generate_renders_and_registers() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());

        let identity = manager.generate(None, &fx.settings()).unwrap();
        let id = identity.to_string();
        assert!(crate::core::identity::validate(&id));

        let path = artifact::artifact_path(&fx.config_dir(), &identity);
        let rendered: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rendered["uuid"], id.as_str());
        assert_eq!(rendered["port"], 51820);
        assert_eq!(rendered["server"], "vpn.example.org");
        assert_eq!(
            rendered["host_keys"],
            serde_json::json!(["ssh-ed25519 AAAAC3Nz", "ssh-rsa AAAAB3Nz"])
        );

        // the private key in the artifact matches the registered public key
        let private = keypair::parse_private(rendered["key"].as_str().unwrap()).unwrap();
        let records = store.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, id);
        assert_eq!(records[0].public_key, keypair::serialize_public(&private).unwrap());
        assert_eq!(store.persists(), 1);
    }

    #[test]
    fn test_generate_with_requested_identity() {
        let fx = Fixture::new(r#"{"uuid":"${client_uuid}","port":${server_port}}"#);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());

        let identity = manager.generate(Some(ID), &fx.settings()).unwrap();
        assert_eq!(identity.to_string(), ID);
        let content = fs::read_to_string(fx.config_dir().join(format!("{}.json", ID))).unwrap();
        assert!(content.contains(r#""uuid":"f47ac10b-58cc-4372-a567-0e02b2c3d479","port":51820"#));
    }

    #[test]
    fn test_generate_invalid_identity() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        let err = manager
            .generate(Some("F47AC10B-58CC-4372-A567-0E02B2C3D479"), &fx.settings())
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidIdentifier(_)));
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_generate_duplicate_identity() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        manager.generate(Some(ID), &fx.settings()).unwrap();
        let first = fs::read_to_string(fx.config_dir().join(format!("{}.json", ID))).unwrap();

        let err = manager.generate(Some(ID), &fx.settings()).unwrap_err();
        assert!(matches!(err, ClientError::DuplicateClient(_)));
        let after = fs::read_to_string(fx.config_dir().join(format!("{}.json", ID))).unwrap();
        assert_eq!(first, after);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_generate_missing_configuration() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        let settings = Settings::with_lookup(|_| None)
            .flag(settings::SERVER_ADDR, Some("vpn.example.org".into()));
        let err = manager.generate(None, &settings).unwrap_err();
        assert!(matches!(err, ClientError::MissingConfiguration(ref n) if n == "SERVER_PORT"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_generate_without_host_keys() {
        let fx = Fixture::new(FULL_TEMPLATE);
        fs::remove_dir_all(fx.dir.path().join("keys")).unwrap();
        fs::create_dir_all(fx.dir.path().join("keys")).unwrap();
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        let err = manager.generate(None, &fx.settings()).unwrap_err();
        assert!(matches!(err, ClientError::NoHostKeysFound { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_generate_missing_template() {
        let fx = Fixture::new(FULL_TEMPLATE);
        fs::remove_file(fx.dir.path().join("template.json")).unwrap();
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        let err = manager.generate(None, &fx.settings()).unwrap_err();
        assert!(matches!(err, ClientError::TemplateNotFound { .. }));
    }

    #[test]
    fn test_generate_unbound_placeholder_leaves_store_untouched() {
        let fx = Fixture::new(r#"{"uuid":"${client_uuid}","extra":"${unknown}"}"#);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        let err = manager.generate(None, &fx.settings()).unwrap_err();
        assert!(matches!(err, ClientError::UnboundPlaceholder(ref n) if n == "unknown"));
        assert!(store.is_empty());
        assert!(!fx.config_dir().exists());
    }

    #[test]
    fn test_write_failure_rolls_back_record() {
        let fx = Fixture::new(FULL_TEMPLATE);
        // a regular file where the config directory should be
        let blocked = fx.dir.path().join("blocked");
        fs::write(&blocked, "").unwrap();
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, &blocked);
        let err = manager.generate(Some(ID), &fx.settings()).unwrap_err();
        assert!(matches!(err, ClientError::Write { .. }));
        assert!(store.is_empty());
        assert_eq!(store.persists(), 0);
    }

    #[test]
    fn test_persist_failure_is_not_fatal() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let mut store = MemoryStore::new();
        store.set_fail_persist(true);
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        manager.generate(Some(ID), &fx.settings()).unwrap();
        manager.remove(ID).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_twice() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir());
        manager.generate(Some(ID), &fx.settings()).unwrap();
        let path = fx.config_dir().join(format!("{}.json", ID));
        assert!(path.exists());

        manager.remove(ID).unwrap();
        assert!(!path.exists());
        let err = manager.remove(ID).unwrap_err();
        assert!(matches!(err, ClientError::ClientNotFound(_)));
    }

    #[test]
    fn test_remove_without_artifact_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_record(ID, "ssh-ed25519 AAAA").unwrap();
        let mut manager = ClientManager::new(&mut store, dir.path());
        manager.remove(ID).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_invalid_identity() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, dir.path());
        assert!(matches!(
            manager.remove("nope"),
            Err(ClientError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_list_with_addresses_and_usage() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_record(OTHER, "ssh-ed25519 BBBB").unwrap();
        store.add_record(ID, "ssh-ed25519 AAAA").unwrap();
        store.add_usage(ID, 3_000_000);
        let mut manager = ClientManager::new(&mut store, dir.path());

        let listings = manager
            .list("https://cfg.example.org/{uuid}.json", true)
            .unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].identity, OTHER);
        assert_eq!(listings[1].identity, ID);
        assert_eq!(
            listings[1].address,
            format!("https://cfg.example.org/{}.json", ID)
        );
        assert_eq!(listings[1].usage_bytes, Some(3_000_000));
        assert_eq!(listings[0].usage_bytes, Some(0));
        assert!(listings[0].fingerprint.is_none());
    }

    #[test]
    fn test_usage_selective_reports_invalid_ids() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_usage(ID, 10);
        store.add_usage(OTHER, 20);
        let mut manager = ClientManager::new(&mut store, dir.path());

        let selection = Selection::Only(vec![ID.into(), "bogus".into(), OTHER.into()]);
        let outcomes = manager.usage(&selection, false).unwrap();
        let ids: Vec<_> = outcomes.iter().map(|o| o.identity.as_str()).collect();
        assert_eq!(ids, vec![OTHER, ID, "bogus"]);
        assert_eq!(outcomes[0].bytes(), Some(20));
        assert!(matches!(
            outcomes[2].result,
            UsageResult::Failed { ref kind, .. } if kind == "invalid-identifier"
        ));
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_usage_selective_reset() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_usage(ID, 10);
        store.add_usage(OTHER, 20);
        let mut manager = ClientManager::new(&mut store, dir.path());

        let outcomes = manager
            .usage(&Selection::Only(vec![ID.into()]), true)
            .unwrap();
        assert_eq!(outcomes[0].bytes(), Some(10));
        assert_eq!(store.get_usage(ID).unwrap(), 0);
        assert_eq!(store.get_usage(OTHER).unwrap(), 20);
    }

    #[test]
    fn test_usage_reset_continues_past_store_failure() {
        const FAILING: &str = "3c0d5a7e-2b1f-4e8a-9c6d-1a2b3c4d5e6f";
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_usage(ID, 10);
        store.add_usage(FAILING, 15);
        store.add_usage(OTHER, 20);
        store.set_fail_usage(FAILING);
        let mut manager = ClientManager::new(&mut store, dir.path());

        let selection = Selection::Only(vec![ID.into(), FAILING.into(), OTHER.into()]);
        let outcomes = manager.usage(&selection, true).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.bytes().is_some()).count(), 2);
        assert_eq!(outcomes[2].identity, FAILING);
        assert!(matches!(
            outcomes[2].result,
            UsageResult::Failed { ref kind, .. } if kind == "store-command"
        ));
        assert_eq!(store.get_usage(ID).unwrap(), 0);
        assert_eq!(store.get_usage(OTHER).unwrap(), 0);
    }

    #[test]
    fn test_reset_all_declined_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_record(ID, "ssh-ed25519 AAAA").unwrap();
        store.add_usage(ID, 99);
        let before = store.mutations();
        let mut manager = ClientManager::new(&mut store, dir.path());

        let outcome = manager.reset_all(|| crate::cli::is_affirmative("n")).unwrap();
        assert!(matches!(outcome, ResetOutcome::Declined));
        assert_eq!(store.mutations(), before);
        assert_eq!(store.get_usage(ID).unwrap(), 99);
    }

    #[test]
    fn test_reset_all_confirmed() {
        let dir = TempDir::new().unwrap();
        let mut store = MemoryStore::new();
        store.add_record(ID, "ssh-ed25519 AAAA").unwrap();
        store.add_record(OTHER, "ssh-ed25519 BBBB").unwrap();
        store.add_usage(ID, 5);
        store.add_usage(OTHER, 7);
        let mut manager = ClientManager::new(&mut store, dir.path());

        let ResetOutcome::Reset(outcomes) = manager.reset_all(|| true).unwrap() else {
            panic!("expected reset");
        };
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].bytes(), Some(7));
        assert_eq!(store.get_usage(ID).unwrap(), 0);
        assert_eq!(store.get_usage(OTHER).unwrap(), 0);
    }

    #[test]
    fn test_audit_trail_written() {
        let fx = Fixture::new(FULL_TEMPLATE);
        let audit_path = fx.dir.path().join("audit.log");
        let mut store = MemoryStore::new();
        let mut manager = ClientManager::new(&mut store, fx.config_dir())
            .with_audit(Some(AuditLog::new(&audit_path)));

        manager.generate(Some(ID), &fx.settings()).unwrap();
        manager.remove(ID).unwrap();
        let _ = manager.remove(ID);

        let log = AuditLog::new(&audit_path);
        let entries = log.read().unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["add", "remove", "remove"]);
        assert!(!entries[2].success);
        let content = fs::read_to_string(&audit_path).unwrap();
        assert!(!content.contains("PRIVATE KEY"));
        assert!(log.verify().unwrap().1.is_empty());
    }

    #[test]
    fn test_client_address() {
        assert_eq!(
            client_address("ssh://{uuid}@host", ID),
            format!("ssh://{}@host", ID)
        );
        assert_eq!(client_address("static", ID), "static");
    }
}
