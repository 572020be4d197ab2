use crate::cli::clients::format_mb;
use crate::cli::{is_affirmative, CliContext};
use crate::core::credstore::CredentialStore;
use crate::core::lifecycle::{ClientManager, Selection};
use crate::models::report::{ResetOutcome, UsageOutcome, UsageResult};
use anyhow::{bail, Context, Result};
use dialoguer::Input;
use tracing::warn;

fn selection(all: bool, ids: &[String]) -> Option<Selection> {
    if all {
        Some(Selection::All)
    } else if ids.is_empty() {
        None
    } else {
        Some(Selection::Only(ids.to_vec()))
    }
}

pub fn run_show<S: CredentialStore + ?Sized>(
    ctx: &CliContext,
    manager: &mut ClientManager<'_, S>,
    all: bool,
    ids: &[String],
) -> Result<()> {
    let Some(selection) = selection(all, ids) else {
        bail!("--show-usage needs client uuids or --all");
    };
    let outcomes = manager.usage(&selection, false)?;
    if !ctx.json && all {
        println!("All users data usages in descending order:\n");
    }
    print_outcomes(ctx, &outcomes)
}

pub fn run_reset<S: CredentialStore + ?Sized>(
    ctx: &CliContext,
    manager: &mut ClientManager<'_, S>,
    all: bool,
    ids: &[String],
) -> Result<()> {
    let Some(selection) = selection(all, ids) else {
        bail!("--reset needs client uuids or --all");
    };

    let outcomes = match selection {
        Selection::All => {
            let assume_yes = ctx.assume_yes;
            match manager.reset_all(|| assume_yes || prompt_confirmation())? {
                ResetOutcome::Declined => {
                    println!("Reset cancelled, nothing was changed.");
                    return Ok(());
                }
                ResetOutcome::Reset(outcomes) => outcomes,
            }
        }
        only => manager.usage(&only, true)?,
    };

    print_outcomes(ctx, &outcomes)?;
    if !ctx.json {
        let failed = outcomes.iter().filter(|o| o.bytes().is_none()).count();
        if failed == 0 {
            println!("\nUsage has been reset for {} client(s).", outcomes.len());
        } else {
            println!(
                "\nUsage has been reset for {} client(s), {} skipped.",
                outcomes.len() - failed,
                failed
            );
        }
    }
    Ok(())
}

fn prompt_confirmation() -> bool {
    let answer = Input::<String>::new()
        .with_prompt("All users data usages will be purged.\n\nAre you sure? (y, n)")
        .allow_empty(true)
        .interact_text();
    match answer {
        Ok(answer) => is_affirmative(&answer),
        Err(e) => {
            warn!("cannot read confirmation: {}", e);
            false
        }
    }
}

fn print_outcomes(ctx: &CliContext, outcomes: &[UsageOutcome]) -> Result<()> {
    if ctx.json {
        let json = serde_json::to_string_pretty(outcomes).context("serialize usage")?;
        println!("{}", json);
        return Ok(());
    }
    for line in outcomes.iter().map(outcome_line) {
        println!("{}", line);
        println!("--------------------");
    }
    Ok(())
}

fn outcome_line(outcome: &UsageOutcome) -> String {
    match &outcome.result {
        UsageResult::Ok { bytes } => format!("{}:\t\t{} MB", outcome.identity, format_mb(*bytes)),
        UsageResult::Failed { error, .. } => {
            format!("{}:\t\tskipped ({})", outcome.identity, error)
        }
    }
}
