// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync management commands: status, sync, refresh and watch.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sb_core::{EntityType, OpKind};

use super::{block_on, Session};
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::sync::{DataEvent, DataManager, SyncEngine, SyncReport, SyncStatus};

/// A queued operation as shown by `status`.
#[derive(Debug, Serialize)]
pub struct PendingView {
    pub id: String,
    pub kind: OpKind,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Everything `status` prints.
#[derive(Debug, Serialize)]
pub struct StatusView {
    pub remote: Option<String>,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub stable: bool,
    pub pending: Vec<PendingView>,
}

impl StatusView {
    pub fn collect(manager: &DataManager, remote: Option<String>) -> Self {
        let pending = manager
            .queue()
            .list()
            .into_iter()
            .map(|op| PendingView {
                entity_id: op.entity_id().to_string(),
                last_error: op.last_error.as_ref().map(|e| format!("{}: {}", e.kind, e.message)),
                id: op.id,
                kind: op.kind,
                entity_type: op.entity_type,
                retry_count: op.retry_count,
            })
            .collect();
        StatusView {
            remote,
            status: manager.sync_status(),
            stable: manager.monitor().is_connection_stable(),
            pending,
        }
    }

    pub fn write(&self, output: OutputFormat, out: &mut impl Write) -> Result<()> {
        if output == OutputFormat::Json {
            serde_json::to_writer_pretty(&mut *out, self)?;
            writeln!(out)?;
            return Ok(());
        }

        match &self.remote {
            Some(url) => writeln!(out, "Remote: {}", url)?,
            None => writeln!(out, "Remote: none (local only)")?,
        }
        writeln!(out, "Connection: {}", self.status.quality)?;
        writeln!(out, "Pending ops: {}", self.status.pending_count)?;
        writeln!(out, "Last sync: {}", format_time(self.status.last_sync))?;
        for op in &self.pending {
            write!(
                out,
                "  {} {} {} (retries: {})",
                op.kind, op.entity_type, op.entity_id, op.retry_count
            )?;
            match &op.last_error {
                Some(error) => writeln!(out, " last error: {}", error)?,
                None => writeln!(out)?,
            }
        }
        Ok(())
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    }
}

/// Show connectivity, queue depth and last sync.
pub fn status(output: OutputFormat) -> Result<()> {
    let session = Session::open()?;
    if session.config.remote.is_some() {
        block_on(session.manager.monitor().check_quality_now())?;
    }
    let view = StatusView::collect(
        &session.manager,
        session.config.remote_url().map(str::to_string),
    );
    view.write(output, &mut std::io::stdout().lock())
}

/// Push queued changes to the remote store.
pub fn sync(retry: bool) -> Result<()> {
    let session = Session::open()?;
    let remote = session.require_remote()?;
    println!("Syncing with {}...", remote.url);
    let manager = Arc::clone(&session.manager);
    let report = block_on(async move {
        if retry {
            manager.retry_now().await
        } else {
            manager.sync_now().await
        }
    })??;
    write_report(&report, &mut std::io::stdout().lock())
}

/// Print a pass report, one line per dropped operation.
pub fn write_report(report: &SyncReport, out: &mut impl Write) -> Result<()> {
    if report.is_empty() {
        writeln!(out, "Nothing to sync.")?;
        return Ok(());
    }
    writeln!(
        out,
        "Sync complete: {} applied, {} failed, {} evicted, {} deferred.",
        report.applied_count, report.failed_count, report.evicted_count, report.deferred_count
    )?;
    for issue in &report.errors {
        writeln!(
            out,
            "  {} {} {} {} {}: {}",
            if issue.evicted { "evicted" } else { "dropped" },
            issue.kind,
            issue.entity_type,
            issue.entity_id,
            issue.error_kind,
            issue.message
        )?;
    }
    Ok(())
}

/// Push queued changes, then reload every entity type from the remote.
pub fn refresh() -> Result<()> {
    let session = Session::open()?;
    session.require_remote()?;
    let manager = Arc::clone(&session.manager);
    let outcome = block_on(async move { manager.force_refresh().await })?;

    let mut out = std::io::stdout().lock();
    if let Some(report) = &outcome.report {
        write_report(report, &mut out)?;
    }
    match &outcome.error {
        None => writeln!(out, "Reloaded from remote.")?,
        Some(e) => {
            eprintln!("warning: {}", e);
            writeln!(out, "Serving cached data.")?;
        }
    }
    Ok(())
}

/// Run the background engine until Ctrl-C.
pub fn watch() -> Result<()> {
    let session = Session::open()?;
    let remote = session.require_remote()?;
    println!("Watching {} (Ctrl-C to stop)...", remote.url);

    let manager = Arc::clone(&session.manager);
    block_on(async move {
        let subscription = manager.subscribe(|event| {
            if let Some(line) = describe_event(event) {
                println!("{}", line);
            }
        });
        let engine = SyncEngine::start(Arc::clone(&manager));

        if let Err(e) = manager.sync_now().await {
            tracing::warn!("initial sync failed: {}", e);
        }
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {}", e);
        }

        engine.shutdown().await;
        subscription.unsubscribe();
    })?;
    Ok(())
}

/// One-line description of a data event, if it is worth printing.
pub fn describe_event(event: &DataEvent) -> Option<String> {
    match event {
        DataEvent::Synced(report) if report.is_empty() => None,
        DataEvent::Synced(report) => Some(format!(
            "synced: {} applied, {} failed, {} deferred",
            report.applied_count, report.failed_count, report.deferred_count
        )),
        DataEvent::SyncFailed { message } => Some(format!("sync failed: {}", message)),
        DataEvent::Reloaded => Some("reloaded".to_string()),
        DataEvent::Changed { entity } => Some(format!("{} changed", entity)),
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
