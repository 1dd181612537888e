use anyhow::Result;
use chrono::Utc;
use mailtrack_core::TrackerCore;
use mailtrack_core::types::{AuditRecord, EntryEnvelope, KeyStatus};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

fn write_json(out: &mut impl Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate(
    core: &TrackerCore,
    out: &mut impl Write,
    format: Format,
    count: usize,
    length: usize,
    comment: &str,
) -> Result<()> {
    let created = core.generate_keys(count, length, comment, Utc::now())?;
    tracing::info!(count = created.len(), "keys generated");
    match format {
        Format::Json => write_json(out, &created)?,
        Format::Text => {
            for record in &created {
                writeln!(out, "{}", record.key)?;
            }
        }
    }
    Ok(())
}

pub fn list(core: &TrackerCore, out: &mut impl Write, format: Format) -> Result<()> {
    let keys = core.list_with_usage();
    match format {
        Format::Json => write_json(out, &keys)?,
        Format::Text => {
            for usage in &keys {
                let state = if usage.used { "used" } else { "available" };
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    usage.record.key,
                    usage.record.created_at.to_rfc3339(),
                    state,
                    usage.record.comment
                )?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    key: &'a str,
    #[serde(flatten)]
    status: KeyStatus,
}

pub fn status(core: &TrackerCore, out: &mut impl Write, format: Format, key: &str) -> Result<()> {
    let status = core.key_status(key)?;
    match format {
        Format::Json => write_json(out, &StatusOutput { key, status })?,
        Format::Text => match status {
            KeyStatus::NotFound => writeln!(out, "{key}: not found")?,
            KeyStatus::Available { created_at } => {
                writeln!(out, "{key}: available (issued {})", created_at.to_rfc3339())?
            }
            KeyStatus::Used { created_at } => {
                writeln!(out, "{key}: used (issued {})", created_at.to_rfc3339())?
            }
        },
    }
    Ok(())
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    key: &'a str,
    #[serde(flatten)]
    entry: EntryEnvelope,
    visits: Vec<AuditRecord>,
}

/// Operator view of an entry; reading it here is never logged as a visit.
pub fn show(core: &TrackerCore, out: &mut impl Write, format: Format, key: &str) -> Result<()> {
    let entry = core.load_entry(key)?;
    let visits = core.visits(key)?;
    match format {
        Format::Json => write_json(
            out,
            &ShowOutput {
                key,
                entry,
                visits,
            },
        )?,
        Format::Text => {
            let data = &entry.data;
            writeln!(out, "key:        {key}")?;
            writeln!(out, "created:    {}", entry.created_at.to_rfc3339())?;
            writeln!(out, "recipient:  {}", data.recipient_name)?;
            writeln!(out, "origin:     {}", data.origin_location)?;
            writeln!(out, "post date:  {}", data.post_date)?;
            if !data.remarks.is_empty() {
                writeln!(out, "remarks:    {}", data.remarks)?;
            }
            writeln!(out, "images:     {}", data.images.len())?;
            writeln!(out, "visits:     {}", visits.len())?;
            for visit in &visits {
                writeln!(
                    out,
                    "  {}  {}  {}",
                    visit.time.to_rfc3339(),
                    visit.client_ip,
                    visit.user_agent
                )?;
            }
        }
    }
    Ok(())
}
