//! CLI routing and command dispatch.

use crate::core::audit::AuditLog;
use crate::core::credstore::CredentialStore;
use crate::core::lifecycle::ClientManager;
use crate::core::redis_store::RedisStore;
use crate::core::settings::{self, Settings};
use crate::error::ClientError;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

pub mod clients;
pub mod usage;

#[derive(Parser, Debug)]
#[command(name = "ssh-client-gen", version, about = "Client management tool for ssh-server")]
pub struct Cli {
    /// Apply --reset / --show-usage to all clients
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Number of new configurations to generate
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub add: u32,

    /// Add one configuration with the specified uuid
    #[arg(long, value_name = "UUID")]
    pub add_with_uuid: Option<String>,

    /// Configuration UUID to remove
    #[arg(long, value_name = "UUID")]
    pub rem: Option<String>,

    /// List configurations
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Show data usage of the given clients, in descending order
    #[arg(long, num_args = 0.., value_name = "UUID")]
    pub show_usage: Option<Vec<String>>,

    /// Reset data usage of the given clients
    #[arg(long, num_args = 0.., value_name = "UUID")]
    pub reset: Option<Vec<String>>,

    /// Do not ask before resetting every client's usage
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Verify the audit log hash chain
    #[arg(long)]
    pub verify_audit: bool,

    /// Path to configuration storage area [env: CONFIG_PATH]
    #[arg(long, value_name = "PATH")]
    pub config_path: Option<String>,

    /// Redis database to connect to [env: REDIS_URL]
    #[arg(long, value_name = "URL")]
    pub redis_url: Option<String>,

    /// Address clients download configs from; `{uuid}` is replaced by the client uuid [env: HOST_ADDR]
    #[arg(long, value_name = "ADDR")]
    pub host_addr: Option<String>,

    /// Server address for the clients to connect to [env: SERVER_ADDR]
    #[arg(long, value_name = "ADDR")]
    pub server_addr: Option<String>,

    /// Server port for the clients to connect to [env: SERVER_PORT]
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Directory holding the server's *_key.pub host keys [env: HOST_KEY_PATH]
    #[arg(long, value_name = "PATH")]
    pub host_key_path: Option<String>,

    /// Client configuration template file [env: TEMPLATE_PATH]
    #[arg(long, value_name = "PATH")]
    pub template_path: Option<String>,

    /// Timeout for each store round trip, in seconds [env: STORE_TIMEOUT_SECS]
    #[arg(long, value_name = "SECS")]
    pub store_timeout_secs: Option<u64>,

    /// Append lifecycle actions to this hash-chained log [env: AUDIT_LOG]
    #[arg(long, value_name = "PATH")]
    pub audit_log: Option<String>,

    /// Log filter when RUST_LOG is unset [env: LOG_LEVEL]
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Load variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,
}

impl Cli {
    /// Load `.env` (or `--env-file`) into the process environment.
    ///
    /// Existing environment variables win over file entries.
    pub fn load_env(&self) -> Result<()> {
        match &self.env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("load env file {}", path.display()))?;
            }
            None => {
                if let Err(e) = dotenvy::dotenv() {
                    if !e.not_found() {
                        return Err(e).context("load .env");
                    }
                }
            }
        }
        Ok(())
    }

    /// Configuration variables: flags first, then the environment.
    pub fn settings(&self) -> Settings {
        Settings::from_env()
            .flag(settings::CONFIG_PATH, self.config_path.clone())
            .flag(settings::REDIS_URL, self.redis_url.clone())
            .flag(settings::HOST_ADDR, self.host_addr.clone())
            .flag(settings::SERVER_ADDR, self.server_addr.clone())
            .flag(settings::SERVER_PORT, self.server_port.map(|p| p.to_string()))
            .flag(settings::HOST_KEY_PATH, self.host_key_path.clone())
            .flag(settings::TEMPLATE_PATH, self.template_path.clone())
            .flag(
                settings::STORE_TIMEOUT_SECS,
                self.store_timeout_secs.map(|s| s.to_string()),
            )
            .flag(settings::AUDIT_LOG, self.audit_log.clone())
            .flag(settings::LOG_LEVEL, self.log_level.clone())
    }

    pub fn run(self) -> Result<()> {
        if self.format != "table" && self.format != "json" {
            bail!("invalid format: {} (use table|json)", self.format);
        }
        let settings = self.settings();
        let audit = settings.audit_log().map(AuditLog::new);

        if self.verify_audit {
            return match &audit {
                Some(log) => clients::run_verify_audit(log),
                None => bail!("--verify-audit needs --audit-log or AUDIT_LOG"),
            };
        }

        let redis_url = settings.require(settings::REDIS_URL)?;
        let timeout = settings.store_timeout()?;
        let mut store = RedisStore::connect(&redis_url, timeout)?;
        store
            .ping()
            .map_err(|e| ClientError::StoreUnavailable(format!("cannot ping redis: {}", e)))?;
        debug!("store reachable");

        let mut manager =
            ClientManager::new(&mut store, settings.config_path()).with_audit(audit);
        let ctx = CliContext {
            settings,
            json: self.format == "json",
            assume_yes: self.yes,
        };
        self.dispatch(&ctx, &mut manager)
    }

    /// Run the requested actions against an already connected store.
    pub fn dispatch<S: CredentialStore + ?Sized>(
        &self,
        ctx: &CliContext,
        manager: &mut ClientManager<'_, S>,
    ) -> Result<()> {
        if let Some(ids) = &self.reset {
            return usage::run_reset(ctx, manager, self.all, ids);
        }

        if let Some(id) = &self.add_with_uuid {
            return clients::run_add(ctx, manager, Some(id), 1);
        }

        if self.add > 0 {
            clients::run_add(ctx, manager, None, self.add)?;
        }

        if let Some(id) = &self.rem {
            clients::run_remove(manager, id)?;
        }

        if self.list {
            clients::run_list(ctx, manager)?;
        }

        if let Some(ids) = &self.show_usage {
            usage::run_show(ctx, manager, self.all, ids)?;
        }

        Ok(())
    }
}

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub settings: Settings,
    pub json: bool,
    pub assume_yes: bool,
}

/// Bulk-destructive confirmation: only an answer starting with `y` proceeds.
pub fn is_affirmative(input: &str) -> bool {
    input.starts_with('y')
}

/// Install the stderr `tracing` subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Print a kind-tagged message and pick the exit code for `err`.
pub fn report_error(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ClientError>() {
        Some(client_err) => {
            eprintln!("error[{}]: {:#}", client_err.kind(), err);
            ExitCode::from(client_err.exit_code())
        }
        None => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
