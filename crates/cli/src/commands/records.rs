// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-entity record commands: list, show, add, update, delete.
//!
//! Every write goes through the data manager, lands in the local cache and
//! queue at once, and is pushed by the next `sync`.

use std::io::Write;

use serde_json::Value;

use sb_core::{EntityType, Record};

use super::{parse_fields, Session};
use crate::cli::{OutputFormat, RecordCommand};
use crate::error::{Error, Result};
use crate::sync::DataManager;

pub fn run(entity: EntityType, command: RecordCommand) -> Result<()> {
    let session = Session::open()?;
    let mut out = std::io::stdout().lock();
    run_impl(&session.manager, entity, command, &mut out)
}

/// Testable core of [`run`].
pub fn run_impl(
    manager: &DataManager,
    entity: EntityType,
    command: RecordCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        RecordCommand::List { output } => list(manager, entity, output, out),
        RecordCommand::Show { id, output } => {
            let record = manager
                .get(entity, &id)
                .ok_or(Error::RecordNotFound { entity, id })?;
            match output {
                OutputFormat::Text => write_record(manager, entity, &record, out),
                OutputFormat::Json => write_json(&record, out),
            }
        }
        RecordCommand::Add { fields, output } => {
            let record = manager.create(entity, parse_fields(&fields)?)?;
            match output {
                OutputFormat::Text => {
                    writeln!(out, "Added {} (queued)", record.id)?;
                    Ok(())
                }
                OutputFormat::Json => write_json(&record, out),
            }
        }
        RecordCommand::Update { id, fields } => {
            let record = manager.update(entity, &id, parse_fields(&fields)?)?;
            writeln!(out, "Updated {} (queued)", record.id)?;
            Ok(())
        }
        RecordCommand::Delete { id } => {
            manager.delete(entity, &id)?;
            writeln!(out, "Deleted {} (queued)", id)?;
            Ok(())
        }
    }
}

fn list(
    manager: &DataManager,
    entity: EntityType,
    output: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let records = manager.get_all(entity);
    match output {
        OutputFormat::Json => write_json(&records, out),
        OutputFormat::Text => {
            if records.is_empty() {
                writeln!(out, "No {}.", entity)?;
                return Ok(());
            }
            for record in &records {
                write_record(manager, entity, record, out)?;
            }
            Ok(())
        }
    }
}

/// One line per record; unsynced records are marked with `*`.
fn write_record(
    manager: &DataManager,
    entity: EntityType,
    record: &Record,
    out: &mut impl Write,
) -> Result<()> {
    let pending = !manager.queue().pending_for(entity, &record.id).is_empty();
    let fields: Vec<String> = record
        .fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, display_value(value)))
        .collect();
    writeln!(
        out,
        "{}{} {}",
        record.id,
        if pending { "*" } else { "" },
        fields.join(" ")
    )?;
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains(' ') => format!("{:?}", s),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T, out: &mut impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
