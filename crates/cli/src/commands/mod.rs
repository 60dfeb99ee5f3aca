// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod init;
pub mod records;
pub mod sync;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;

use sb_core::{EntityType, LocalStorage, Record, SqliteStorage};

use crate::config::{find_work_dir, get_db_path, Config, RemoteConfig};
use crate::env;
use crate::error::{Error, Result};
use crate::sync::{DataManager, RemoteError, RemoteFuture, RemoteStore, WebSocketRemote};

/// Everything a command needs: config plus a wired data manager.
pub struct Session {
    pub config: Config,
    pub work_dir: PathBuf,
    pub manager: Arc<DataManager>,
    // Keeps the platform channel open for the manager's lifetime
    _platform: watch::Sender<bool>,
}

impl Session {
    /// Open the project found from the current directory.
    pub fn open() -> Result<Self> {
        let work_dir = find_work_dir()?;
        let config = Config::load(&work_dir)?;
        let db_path = get_db_path(&work_dir, &config);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage: Arc<dyn LocalStorage> = Arc::new(SqliteStorage::open(&db_path)?);
        tracing::debug!("opened {}", db_path.display());

        let (remote, online): (Arc<dyn RemoteStore>, bool) = match &config.remote {
            Some(remote) => (
                Arc::new(WebSocketRemote::new(remote.url.clone())),
                !env::force_offline(),
            ),
            None => (Arc::new(LocalOnly), false),
        };
        let probes = match &config.remote {
            Some(_) => config.probes(&remote),
            None => Vec::new(),
        };

        let (platform, rx) = watch::channel(online);
        let manager = DataManager::new(storage, remote, rx, probes, config.to_settings());
        Ok(Session {
            config,
            work_dir,
            manager,
            _platform: platform,
        })
    }

    /// The remote config, or a hint on how to add one.
    pub fn require_remote(&self) -> Result<&RemoteConfig> {
        self.config.remote.as_ref().ok_or_else(|| {
            Error::Config(
                "no remote configured\n  hint: add a [remote] section with url = \"ws://host:port\" to .stockbook/config.toml"
                    .to_string(),
            )
        })
    }
}

/// Remote used when no `[remote]` is configured.
///
/// The platform flag stays offline, so the gate never calls it.
pub struct LocalOnly;

impl LocalOnly {
    fn refuse<'a, T: Send + 'a>() -> RemoteFuture<'a, T> {
        Box::pin(async { Err(RemoteError::transient("no remote configured")) })
    }
}

impl RemoteStore for LocalOnly {
    fn ping(&self) -> RemoteFuture<'_, ()> {
        Self::refuse()
    }

    fn create(&self, _entity: EntityType, _record: Record) -> RemoteFuture<'_, Record> {
        Self::refuse()
    }

    fn update(&self, _entity: EntityType, _record: Record) -> RemoteFuture<'_, Record> {
        Self::refuse()
    }

    fn delete(&self, _entity: EntityType, _id: String) -> RemoteFuture<'_, ()> {
        Self::refuse()
    }

    fn list(&self, _entity: EntityType) -> RemoteFuture<'_, Vec<Record>> {
        Self::refuse()
    }
}

/// Run `fut` to completion on a fresh runtime.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()?;
    Ok(rt.block_on(fut))
}

/// Parse `key=value` arguments into a field map.
///
/// Values that parse as JSON (numbers, booleans, null, quoted strings)
/// keep their type; anything else is taken as a plain string.
pub fn parse_fields(args: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| Error::InvalidField(arg.clone()))?;
        let key = key.trim();
        if key.is_empty() || key == "id" {
            return Err(Error::InvalidField(arg.clone()));
        }
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null | Value::String(_))) => v,
            _ => Value::String(raw.to_string()),
        };
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
