//! Commit markers: one small file per in-doubt transaction.
//!
//! ```text
//! <system dir>/transactions/
//! ├── ex-20240101-0001      # comment lines, mtime = creation time
//! └── ex-20240101-0002
//! ```
//!
//! A marker is created before any attempt writes output and deleted only
//! once every data source finished the transaction. Its presence is the only
//! durable "not yet finalized" signal.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tessera_config::Config;
use tessera_store::{FileStatus, FileStore, StoreError};
use tracing::instrument;

use crate::{OutputError, Result};

/// Summary of one in-doubt transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfo {
    pub transaction_id: String,
    /// Marker modification time
    pub created_at: DateTime<Utc>,
    /// Marker content, one entry per line
    pub comment: Vec<String>,
    pub marker_path: PathBuf,
}

/// Reads and writes commit markers below one directory
#[derive(Debug, Clone)]
pub struct CommitMarkerStore {
    store: Arc<dyn FileStore>,
    dir: PathBuf,
}

impl CommitMarkerStore {
    pub fn new(store: Arc<dyn FileStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
        }
    }

    /// Markers under `<system.dir>/transactions`
    pub fn from_config(config: &Config, store: Arc<dyn FileStore>) -> Self {
        Self::new(store, config.transactions_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker_path(&self, transaction_id: &str) -> Result<PathBuf> {
        validate_id("transaction id", transaction_id)?;
        Ok(self.dir.join(transaction_id))
    }

    /// Create the marker unless it already exists.
    ///
    /// Returns false when a marker for `transaction_id` was already present;
    /// its content is left untouched.
    #[instrument(skip(self, comment), level = "debug")]
    pub fn create(&self, transaction_id: &str, comment: &[String]) -> Result<bool> {
        let path = self.marker_path(transaction_id)?;
        let mut output = match self.store.create_new(&path) {
            Ok(output) => output,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(false)
            }
            Err(e) => return Err(e.into()),
        };
        for line in comment {
            writeln!(output, "{}", line).map_err(StoreError::from)?;
        }
        output.flush().map_err(StoreError::from)?;
        Ok(true)
    }

    pub fn get(&self, transaction_id: &str) -> Result<Option<TransactionInfo>> {
        let path = self.marker_path(transaction_id)?;
        match self.store.status(&path)? {
            Some(status) if !status.is_dir => Ok(Some(self.to_info(transaction_id, &status))),
            _ => Ok(None),
        }
    }

    /// Every marker, oldest first
    pub fn list(&self) -> Result<Vec<TransactionInfo>> {
        let mut results = Vec::new();
        for status in self.store.list(&self.dir, false)? {
            if status.is_dir {
                continue;
            }
            let Some(id) = status.path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            results.push(self.to_info(id, &status));
        }
        results.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(results)
    }

    /// Remove the marker. Returns false if it was already gone.
    pub fn delete(&self, transaction_id: &str) -> Result<bool> {
        let path = self.marker_path(transaction_id)?;
        Ok(self.store.delete(&path, false)?)
    }

    fn to_info(&self, transaction_id: &str, status: &FileStatus) -> TransactionInfo {
        let created_at = DateTime::<Utc>::from(status.modified.unwrap_or(UNIX_EPOCH));
        let comment = match self.read_comment(&status.path) {
            Ok(lines) => lines,
            Err(e) => vec![e.to_string()],
        };
        TransactionInfo {
            transaction_id: transaction_id.to_string(),
            created_at,
            comment,
            marker_path: status.path.clone(),
        }
    }

    fn read_comment(&self, path: &Path) -> Result<Vec<String>> {
        let mut text = String::new();
        self.store
            .open(path, 0)?
            .read_to_string(&mut text)
            .map_err(StoreError::from)?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

/// Reject ids that would escape their directory or nest
pub(crate) fn validate_id(what: &str, id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(OutputError::InvalidArgument(format!(
            "{} must be a single path segment: {:?}",
            what, id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tessera_store::LocalStore;

    fn markers(temp: &TempDir) -> CommitMarkerStore {
        CommitMarkerStore::new(Arc::new(LocalStore::new()), temp.path().join("transactions"))
    }

    #[test]
    fn test_create_get_delete() {
        let temp = TempDir::new().unwrap();
        let markers = markers(&temp);
        let comment = vec!["batch=daily".to_string(), "flow=load".to_string()];

        assert!(markers.create("ex1", &comment).unwrap());
        let info = markers.get("ex1").unwrap().unwrap();
        assert_eq!(info.transaction_id, "ex1");
        assert_eq!(info.comment, comment);
        assert_eq!(info.marker_path, temp.path().join("transactions/ex1"));

        assert!(markers.delete("ex1").unwrap());
        assert!(markers.get("ex1").unwrap().is_none());
        assert!(!markers.delete("ex1").unwrap());
    }

    #[test]
    fn test_create_is_create_if_absent() {
        let temp = TempDir::new().unwrap();
        let markers = markers(&temp);
        assert!(markers.create("ex1", &["first".to_string()]).unwrap());
        assert!(!markers.create("ex1", &["second".to_string()]).unwrap());
        assert_eq!(markers.get("ex1").unwrap().unwrap().comment, vec!["first"]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(markers(&temp).list().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_by_creation() {
        let temp = TempDir::new().unwrap();
        let markers = markers(&temp);
        markers.create("b", &[]).unwrap();
        markers.create("a", &[]).unwrap();

        let list = markers.list().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].created_at <= list[1].created_at);
        if list[0].created_at == list[1].created_at {
            assert_eq!(list[0].transaction_id, "a");
        }
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let temp = TempDir::new().unwrap();
        let markers = markers(&temp);
        for id in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                markers.create(id, &[]),
                Err(OutputError::InvalidArgument(_))
            ));
        }
    }
}
