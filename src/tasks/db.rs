//! Task database
//!
//! `<cache>/tasks.json` records, per task, the sha256 of every file dep and
//! the digest of its config values at the last successful run.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{Task, Uptodate};
use crate::error::Result;
use crate::files::write_atomic;

/// Lowercase hex sha256 of a file's contents
pub fn file_digest(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Value with every mapping's keys sorted
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, canonical(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Digest of config values, independent of key order
pub fn config_digest(values: &[&Value]) -> String {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(canonical(value).to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// What a task looked like when it last succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// Persistent task records
#[derive(Debug, Clone, Default)]
pub struct TaskDb {
    path: PathBuf,
    records: BTreeMap<String, TaskRecord>,
}

impl TaskDb {
    /// Open the database, starting empty when the file is missing or unreadable
    pub fn open(path: &Path) -> Self {
        let records = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("discarding unreadable task database {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            records,
        }
    }

    /// A database that is never saved
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.records.get(task)
    }

    pub fn forget(&mut self, task: &str) {
        self.records.remove(task);
    }

    /// Reason the task must run, or `None` when it is up to date
    pub fn stale_reason(&self, root: &Path, task: &Task) -> Option<String> {
        if task.file_dep.is_empty() && task.uptodate.is_empty() {
            return Some("no dependencies".to_string());
        }
        if task.uptodate.iter().any(|u| matches!(u, Uptodate::Bool(false))) {
            return Some("marked out of date".to_string());
        }
        let Some(record) = self.records.get(&task.name) else {
            return Some("never run".to_string());
        };
        for target in &task.targets {
            if !root.join(target).exists() {
                return Some(format!("missing target {}", target.display()));
            }
        }
        for dep in &task.file_dep {
            let key = dep.to_string_lossy().replace('\\', "/");
            let current = file_digest(&root.join(dep)).ok();
            if current.as_ref() != record.files.get(&key) {
                return Some(format!("{} changed", key));
            }
        }
        let values = task.config_values();
        if !values.is_empty() && record.config.as_deref() != Some(config_digest(&values).as_str()) {
            return Some("configuration changed".to_string());
        }
        None
    }

    /// Record a successful run
    pub fn remember(&mut self, root: &Path, task: &Task) {
        let files = task
            .file_dep
            .iter()
            .filter_map(|dep| {
                let digest = file_digest(&root.join(dep)).ok()?;
                Some((dep.to_string_lossy().replace('\\', "/"), digest))
            })
            .collect();
        let values = task.config_values();
        let config = (!values.is_empty()).then(|| config_digest(&values));
        self.records.insert(task.name.clone(), TaskRecord { files, config });
    }

    pub fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(&self.records)?;
        write_atomic(&self.path, &(text + "\n"))
    }
}
