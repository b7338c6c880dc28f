//! `gfr exclusions` subcommands

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::cli::ExclusionCommand;
use gfr_core::exclusion::{ExclusionEntry, ExclusionError, ExclusionStore};

/// Run one exclusion command, writing human output to `out`
pub fn execute(
    store: &dyn ExclusionStore,
    command: ExclusionCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        ExclusionCommand::List => {
            let entries = store.list_live().context("Failed to read exclusions")?;
            write_table(&entries, out)?;
        }
        ExclusionCommand::Sweep => {
            let expired = store.sweep(Utc::now()).context("Failed to sweep exclusions")?;
            for entry in &expired {
                writeln!(out, "expired {} ({})", entry.node, entry.reason)?;
            }
            writeln!(out, "{} expired exclusion(s) removed", expired.len())?;
        }
        ExclusionCommand::Pause {
            node,
            instance_id,
            reason,
            ttl,
        } => {
            let mut entry = ExclusionEntry::new(&node, &reason).with_ttl(ttl);
            if let Some(id) = instance_id {
                entry = entry.with_instance(id);
            }

            match store.insert(entry) {
                Ok(()) => writeln!(out, "paused {} ({})", node, reason)?,
                Err(ExclusionError::AlreadyExcluded { reason, .. }) => {
                    anyhow::bail!("{} is already excluded ({})", node, reason)
                }
                Err(e) => return Err(e).context("Failed to write exclusion"),
            }
        }
        ExclusionCommand::Resume { node } => {
            match store.remove(&node).context("Failed to remove exclusion")? {
                Some(entry) => writeln!(out, "resumed {} (was {})", node, entry.reason)?,
                None => writeln!(out, "{} was not excluded", node)?,
            }
        }
    }
    Ok(())
}

fn write_table(entries: &[ExclusionEntry], out: &mut impl Write) -> Result<()> {
    if entries.is_empty() {
        writeln!(out, "no live exclusions")?;
        return Ok(());
    }

    let now = Utc::now();
    writeln!(
        out,
        "{:<32} {:<28} {:<20} {:<25} REMAINING",
        "NODE", "REASON", "INSTANCE", "SINCE"
    )?;
    for entry in entries {
        let remaining = match entry.remaining(now) {
            Some(left) => humantime::format_duration(std::time::Duration::from_secs(left.as_secs()))
                .to_string(),
            None => "never expires".to_string(),
        };
        writeln!(
            out,
            "{:<32} {:<28} {:<20} {:<25} {}",
            entry.node,
            entry.reason,
            entry.instance_id.as_deref().unwrap_or("-"),
            entry.inserted_at.format("%Y-%m-%dT%H:%M:%SZ"),
            remaining
        )?;
    }
    Ok(())
}
