//! Bulk file moves between directories of one store.
//!
//! Every file is moved with the store's atomic `rename`, so a crash leaves
//! each file either at its source or at its destination, never half-copied.
//! Re-running a move after a failure picks up the remaining files.
//!
//! # Thread Pool Configuration
//!
//! With `parallelism > 1` renames run on a dedicated rayon pool of exactly
//! that size, created for the call and dropped afterwards.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPool;
use tessera_config::path::compute_relative_path;
use tessera_config::{log_move_debug, log_move_trace};
use tessera_store::{CancelToken, Counter, FileStore, Result, StoreError};
use tracing::field::display;
use tracing::instrument;

/// Result of one bulk move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveStats {
    /// Number of files moved
    pub files: u64,
    /// Total bytes of the moved files
    pub bytes: u64,
}

/// One file to move, relative to the source root
#[derive(Debug)]
struct MoveItem {
    relative: PathBuf,
    len: u64,
}

/// Moves a directory tree file by file.
#[derive(Debug, Clone, Copy)]
pub struct BulkMover {
    parallelism: usize,
}

impl Default for BulkMover {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BulkMover {
    /// `parallelism <= 1` moves serially on the calling thread.
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Move every file below `source` to the same relative path below
    /// `destination`.
    ///
    /// An existing destination entry at the same relative path is replaced;
    /// other destination files are left alone. A missing `source` moves
    /// nothing. The first failing file aborts the call; files moved before it
    /// stay moved. `counter` receives the byte length of each moved file.
    #[instrument(skip(self, counter, cancel, store), level = "debug")]
    pub fn move_tree(
        &self,
        counter: &dyn Counter,
        cancel: &CancelToken,
        store: &dyn FileStore,
        source: &Path,
        destination: &Path,
    ) -> Result<MoveStats> {
        cancel.check()?;
        let items = list_relative(store, source)?;
        if items.is_empty() {
            log_move_debug!("Nothing to move", from = display(source.display()));
            return Ok(MoveStats::default());
        }
        log_move_debug!(
            "Start moving files",
            from = display(source.display()),
            to = display(destination.display()),
            count = items.len(),
            threads = self.parallelism
        );

        // each parent once, before any rename can race for it
        let parents: BTreeSet<PathBuf> = items
            .iter()
            .filter_map(|item| destination.join(&item.relative).parent().map(Path::to_path_buf))
            .collect();
        for parent in &parents {
            cancel.check()?;
            store.mkdirs(parent)?;
        }

        let move_one = |item: &MoveItem| -> Result<u64> {
            cancel.check()?;
            let from = source.join(&item.relative);
            let to = destination.join(&item.relative);
            if let Some(existing) = store.status(&to)? {
                log_move_debug!("Replacing existing file", path = display(to.display()));
                store.delete(&to, existing.is_dir)?;
            }
            log_move_trace!(
                "Moving file",
                from = display(from.display()),
                to = display(to.display()),
                size = item.len
            );
            if !store.rename(&from, &to)? {
                return Err(StoreError::RenameFailed { from, to });
            }
            counter.add(item.len);
            Ok(item.len)
        };

        let bytes = if self.parallelism > 1 {
            let pool = create_thread_pool(self.parallelism)?;
            pool.install(|| {
                items
                    .par_iter()
                    .map(move_one)
                    .try_reduce(|| 0, |a, b| Ok(a + b))
            })?
        } else {
            let mut total = 0;
            for item in &items {
                total += move_one(item)?;
            }
            total
        };

        let stats = MoveStats {
            files: items.len() as u64,
            bytes,
        };
        log_move_debug!(
            "Finish moving files",
            from = display(source.display()),
            to = display(destination.display()),
            count = stats.files,
            bytes = stats.bytes
        );
        Ok(stats)
    }
}

/// Files below `source`, relative to it, sorted
fn list_relative(store: &dyn FileStore, source: &Path) -> Result<Vec<MoveItem>> {
    let mut items = Vec::new();
    for status in store.list(source, true)? {
        if status.is_dir {
            continue;
        }
        let relative = match compute_relative_path(source, &status.path) {
            Some(relative) if !relative.as_os_str().is_empty() => relative,
            _ => {
                return Err(StoreError::InvalidArgument(format!(
                    "move source must be a directory: {}",
                    source.display()
                )))
            }
        };
        items.push(MoveItem {
            relative,
            len: status.len,
        });
    }
    items.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(items)
}

fn create_thread_pool(threads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("tessera-move-{}", i))
        .build()
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tessera_store::{ByteCounter, LocalStore};

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_source_moves_nothing() {
        let temp = TempDir::new().unwrap();
        let stats = BulkMover::new(1)
            .move_tree(
                &ByteCounter::new(),
                &CancelToken::new(),
                &LocalStore::new(),
                &temp.path().join("nope"),
                &temp.path().join("dst"),
            )
            .unwrap();
        assert_eq!(stats, MoveStats::default());
        assert!(!temp.path().join("dst").exists());
    }

    #[test]
    fn test_merge_into_existing_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        write(&src, "a/1.txt", "new-1");
        write(&src, "b/2.txt", "new-2");
        write(&dst, "a/1.txt", "old-1");
        write(&dst, "c/3.txt", "old-3");

        let counter = ByteCounter::new();
        let stats = BulkMover::new(1)
            .move_tree(&counter, &CancelToken::new(), &LocalStore::new(), &src, &dst)
            .unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 10);
        assert_eq!(counter.get(), 10);
        assert_eq!(fs::read_to_string(dst.join("a/1.txt")).unwrap(), "new-1");
        assert_eq!(fs::read_to_string(dst.join("b/2.txt")).unwrap(), "new-2");
        assert_eq!(fs::read_to_string(dst.join("c/3.txt")).unwrap(), "old-3");
        assert!(!src.join("a/1.txt").exists());
    }

    #[test]
    fn test_parallel_move() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        for i in 0..50 {
            write(&src, &format!("d{}/f{}.txt", i % 7, i), "x");
        }

        let stats = BulkMover::new(4)
            .move_tree(&ByteCounter::new(), &CancelToken::new(), &LocalStore::new(), &src, &dst)
            .unwrap();
        assert_eq!(stats.files, 50);
        for i in 0..50 {
            assert!(dst.join(format!("d{}/f{}.txt", i % 7, i)).exists());
        }
    }

    #[test]
    fn test_cancelled_move_reports_cancelled() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src, "f.txt", "x");
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = BulkMover::new(1).move_tree(
            &ByteCounter::new(),
            &cancel,
            &LocalStore::new(),
            &src,
            &temp.path().join("dst"),
        );
        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert!(src.join("f.txt").exists());
    }

    #[test]
    fn test_file_source_rejected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "f.txt", "x");
        let result = BulkMover::new(1).move_tree(
            &ByteCounter::new(),
            &CancelToken::new(),
            &LocalStore::new(),
            &temp.path().join("f.txt"),
            &temp.path().join("dst"),
        );
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }
}
