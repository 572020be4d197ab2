use crate::cli::CliContext;
use crate::core::audit::AuditLog;
use crate::core::credstore::CredentialStore;
use crate::core::lifecycle::{client_address, ClientManager};
use crate::core::settings;
use crate::models::report::ClientListing;
use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};

/// Generate `count` clients (or the one requested) and print their addresses.
pub fn run_add<S: CredentialStore + ?Sized>(
    ctx: &CliContext,
    manager: &mut ClientManager<'_, S>,
    requested: Option<&str>,
    count: u32,
) -> Result<()> {
    let host_addr = ctx.settings.require(settings::HOST_ADDR)?;
    for _ in 0..count {
        let identity = manager.generate(requested, &ctx.settings)?;
        println!("{}", client_address(&host_addr, &identity.to_string()));
    }
    Ok(())
}

pub fn run_remove<S: CredentialStore + ?Sized>(
    manager: &mut ClientManager<'_, S>,
    id: &str,
) -> Result<()> {
    manager.remove(id)?;
    println!("Removed {}", id);
    Ok(())
}

pub fn run_list<S: CredentialStore + ?Sized>(
    ctx: &CliContext,
    manager: &mut ClientManager<'_, S>,
) -> Result<()> {
    let host_addr = ctx.settings.require(settings::HOST_ADDR)?;
    let items = manager.list(&host_addr, true)?;

    if ctx.json {
        let json = serde_json::to_string_pretty(&items).context("serialize list")?;
        println!("{}", json);
        return Ok(());
    }

    if items.is_empty() {
        println!("No clients found");
        return Ok(());
    }

    println!("{}", listing_table(&items));
    Ok(())
}

fn listing_table(items: &[ClientListing]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Client UUID").add_attribute(Attribute::Bold),
        Cell::new("Config Address").add_attribute(Attribute::Bold),
        Cell::new("Key Fingerprint").add_attribute(Attribute::Bold),
        Cell::new("Data Usage").add_attribute(Attribute::Bold),
    ]);
    for item in items {
        let usage = item
            .usage_bytes
            .map(|b| format!("{} MB", format_mb(b)))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            item.identity.clone(),
            item.address.clone(),
            item.fingerprint.clone().unwrap_or_else(|| "-".to_string()),
            usage,
        ]);
    }
    table
}

pub fn run_verify_audit(log: &AuditLog) -> Result<()> {
    let (total, errors) = log.verify()?;
    if total == 0 {
        println!("No audit entries to verify.");
        return Ok(());
    }
    for err in &errors {
        println!("  [FAIL] {}", err);
    }
    if !errors.is_empty() {
        bail!("audit chain: {} entries, {} errors", total, errors.len());
    }
    println!("Audit chain: {} entries verified, 0 errors", total);
    Ok(())
}

/// Whole megabytes (10^6 bytes), rounded.
pub fn format_mb(bytes: i64) -> String {
    format!("{:.0}", (bytes as f64 / crate::constants::BYTES_PER_MB).round())
}
