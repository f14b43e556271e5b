//! Staged output of one data source.
//!
//! ## Layout
//!
//! ```text
//! <temp_path>/<transaction>-<data source>/
//! ├── staging/                 # committed attempts, not yet visible
//! └── attempts/
//!     └── <attempt>/           # files written by one attempt
//! ```
//!
//! Output becomes visible in `fs_path` only by atomic renames: attempt →
//! staging on attempt commit, staging → production on transaction commit.
//! With staging disabled, attempts move straight into production.
//!
//! Every step tolerates being repeated after a crash: directories that are
//! already gone count as done.

use std::io::{Read, Take, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tessera_config::path::append_logical;
use tessera_config::{log_output_debug, log_output_trace, log_output_warn};
use tessera_fragment::Fragment;
use tessera_store::{
    open_range, CancelToken, Counter, CountingReader, CountingWriter, FileStatus, FileStore,
    NoopCounter,
};
use tracing::field::display;
use tracing::instrument;

use crate::context::{AttemptContext, TransactionContext};
use crate::marker::validate_id;
use crate::mover::{BulkMover, MoveStats};
use crate::profile::DataSourceProfile;
use crate::{OutputError, Result};

const STAGING: &str = "staging";
const ATTEMPTS: &str = "attempts";

/// Writer returned by [`StagedOutput::open_output`]
pub type OutputStream = CountingWriter<Box<dyn Write + Send>>;

/// Reader returned by [`StagedOutput::open_input`]
pub type InputStream = CountingReader<Take<Box<dyn Read + Send>>>;

/// One data source instance driving the staged output protocol.
#[derive(Debug)]
pub struct StagedOutput {
    profile: DataSourceProfile,
    store: Arc<dyn FileStore>,
    mover: BulkMover,
}

impl StagedOutput {
    pub fn new(profile: DataSourceProfile, store: Arc<dyn FileStore>) -> Self {
        let mover = BulkMover::new(profile.move_threads);
        Self {
            profile,
            store,
            mover,
        }
    }

    pub fn profile(&self) -> &DataSourceProfile {
        &self.profile
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// `<temp>/<transaction>-<data source>`
    pub fn transaction_dir(&self, transaction_id: &str, data_source_id: &str) -> Result<PathBuf> {
        validate_id("transaction id", transaction_id)?;
        validate_id("data source id", data_source_id)?;
        Ok(self
            .profile
            .temp_path
            .join(format!("{}-{}", transaction_id, data_source_id)))
    }

    pub fn staging_dir(&self, ctx: &TransactionContext) -> Result<PathBuf> {
        Ok(self
            .transaction_dir(ctx.transaction_id(), ctx.data_source_id())?
            .join(STAGING))
    }

    pub fn attempts_dir(&self, ctx: &TransactionContext) -> Result<PathBuf> {
        Ok(self
            .transaction_dir(ctx.transaction_id(), ctx.data_source_id())?
            .join(ATTEMPTS))
    }

    pub fn attempt_dir(&self, ctx: &AttemptContext) -> Result<PathBuf> {
        validate_id("attempt id", ctx.attempt_id())?;
        Ok(self
            .transaction_dir(ctx.transaction_id(), ctx.data_source_id())?
            .join(ATTEMPTS)
            .join(ctx.attempt_id()))
    }

    /// `<fs_path>/<base_path>`; `..` segments are rejected
    fn production_path(&self, base_path: &str) -> Result<PathBuf> {
        if base_path.split('/').any(|segment| segment == "..") {
            return Err(OutputError::InvalidArgument(format!(
                "base path must stay inside the data source: {:?}",
                base_path
            )));
        }
        Ok(append_logical(&self.profile.fs_path, base_path))
    }

    fn is_temporary(&self, path: &Path) -> bool {
        path.starts_with(&self.profile.temp_path)
    }

    // ------------------------------------------------------------------
    // Transaction
    // ------------------------------------------------------------------

    /// Create the staging area. Does nothing when staging is disabled.
    #[instrument(skip(self), level = "debug")]
    pub fn setup_transaction(&self, ctx: &TransactionContext) -> Result<()> {
        if !self.profile.output_staging {
            return Ok(());
        }
        let staging = self.staging_dir(ctx)?;
        log_output_debug!(
            "Create staging area",
            id = self.profile.id.as_str(),
            path = display(staging.display())
        );
        self.store.mkdirs(&staging)?;
        Ok(())
    }

    /// Move staged files into production.
    ///
    /// Progress is returned as [`MoveStats`]; the context counter only sees
    /// payload bytes. Repeatable: once staging is empty or gone this is a
    /// successful no-op.
    #[instrument(skip(self), level = "debug")]
    pub fn commit_transaction(&self, ctx: &TransactionContext) -> Result<MoveStats> {
        if !self.profile.output_staging {
            return Ok(MoveStats::default());
        }
        let staging = self.staging_dir(ctx)?;
        log_output_debug!(
            "Commit staging area",
            id = self.profile.id.as_str(),
            from = display(staging.display()),
            to = display(self.profile.fs_path.display())
        );
        Ok(self.mover.move_tree(
            &NoopCounter,
            ctx.cancel(),
            self.store.as_ref(),
            &staging,
            &self.profile.fs_path,
        )?)
    }

    /// Delete everything the transaction left in the temporary area.
    #[instrument(skip(self), level = "debug")]
    pub fn cleanup_transaction(&self, ctx: &TransactionContext) -> Result<()> {
        let dir = self.transaction_dir(ctx.transaction_id(), ctx.data_source_id())?;
        log_output_debug!(
            "Delete transaction area",
            id = self.profile.id.as_str(),
            path = display(dir.display())
        );
        self.store.delete(&dir, true)?;
        Ok(())
    }

    /// Delete the attempt areas of every attempt of the transaction.
    #[instrument(skip(self), level = "debug")]
    pub fn cleanup_attempts(&self, ctx: &TransactionContext) -> Result<()> {
        let dir = self.attempts_dir(ctx)?;
        log_output_debug!(
            "Delete attempt areas",
            id = self.profile.id.as_str(),
            path = display(dir.display())
        );
        self.store.delete(&dir, true)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attempt
    // ------------------------------------------------------------------

    #[instrument(skip(self), level = "debug")]
    pub fn setup_attempt(&self, ctx: &AttemptContext) -> Result<()> {
        let attempt = self.attempt_dir(ctx)?;
        log_output_debug!(
            "Create attempt area",
            id = self.profile.id.as_str(),
            path = display(attempt.display())
        );
        self.store.mkdirs(&attempt)?;
        Ok(())
    }

    /// Open `<attempt>/<base_path>/<resource_path>` for writing.
    ///
    /// Written bytes are reported to the context counter.
    #[instrument(skip(self), level = "debug")]
    pub fn open_output(
        &self,
        ctx: &AttemptContext,
        base_path: &str,
        resource_path: &str,
    ) -> Result<OutputStream> {
        ctx.cancel().check()?;
        let attempt = self.attempt_dir(ctx)?;
        let file = append_logical(&append_logical(&attempt, base_path), resource_path);
        let escapes = base_path
            .split('/')
            .chain(resource_path.split('/'))
            .any(|segment| segment == "..");
        if file == attempt || escapes {
            return Err(OutputError::InvalidArgument(format!(
                "output must name a file below the attempt area: {:?}/{:?}",
                base_path, resource_path
            )));
        }
        log_output_debug!(
            "Open output",
            id = self.profile.id.as_str(),
            path = display(file.display())
        );
        let output = self.store.create(&file)?;
        Ok(CountingWriter::new(
            output,
            Arc::clone(ctx.counter()),
            ctx.cancel().clone(),
        ))
    }

    /// Promote the attempt: into staging, or straight into production when
    /// staging is disabled. A missing attempt area moves nothing. The context
    /// counter is left alone.
    #[instrument(skip(self), level = "debug")]
    pub fn commit_attempt(&self, ctx: &AttemptContext) -> Result<MoveStats> {
        let attempt = self.attempt_dir(ctx)?;
        let target = if self.profile.output_staging {
            self.staging_dir(&ctx.transaction())?
        } else {
            self.profile.fs_path.clone()
        };
        log_output_debug!(
            "Commit attempt area",
            id = self.profile.id.as_str(),
            path = display(attempt.display()),
            staging = self.profile.output_staging
        );
        Ok(self.mover.move_tree(
            &NoopCounter,
            ctx.cancel(),
            self.store.as_ref(),
            &attempt,
            &target,
        )?)
    }

    /// Delete the attempt area; an absent area is already clean.
    #[instrument(skip(self), level = "debug")]
    pub fn cleanup_attempt(&self, ctx: &AttemptContext) -> Result<()> {
        let attempt = self.attempt_dir(ctx)?;
        log_output_debug!(
            "Delete attempt area",
            id = self.profile.id.as_str(),
            path = display(attempt.display())
        );
        self.store.delete(&attempt, true)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Input and maintenance
    // ------------------------------------------------------------------

    /// Plan fragments for every file below `<fs_path>/<base_path>`.
    ///
    /// Files in the temporary area are never inputs.
    #[instrument(skip(self), level = "debug")]
    pub fn find_input_fragments(&self, base_path: &str) -> Result<Vec<Fragment>> {
        let base = self.production_path(base_path)?;
        let files: Vec<FileStatus> = self
            .store
            .list(&base, true)?
            .into_iter()
            .filter(|s| !s.is_dir && !self.is_temporary(&s.path))
            .collect();
        log_output_debug!(
            "Start finding input",
            id = self.profile.id.as_str(),
            path = base_path,
            files = files.len()
        );

        let computer = self.profile.fragment_computer();
        let mut results = Vec::new();
        for file in &files {
            let Some(path) = file.path.to_str() else {
                log_output_warn!(
                    "Skip input with non UTF-8 path",
                    id = self.profile.id.as_str(),
                    path = display(file.path.display())
                );
                continue;
            };
            let blocks = self.store.block_placement(&file.path, 0..file.len)?;
            let fragments = computer.compute_fragments(path, file.len, blocks)?;
            for fragment in &fragments {
                log_output_trace!(
                    "Fragment found",
                    path = fragment.path(),
                    offset = fragment.offset(),
                    size = fragment.size(),
                    owners = tracing::field::debug(fragment.owner_hosts())
                );
            }
            results.extend(fragments);
        }
        log_output_debug!(
            "Finish finding input",
            id = self.profile.id.as_str(),
            path = base_path,
            fragments = results.len()
        );
        Ok(results)
    }

    /// Open the byte range of `fragment`; bytes read go to `counter`.
    pub fn open_input(
        &self,
        fragment: &Fragment,
        counter: Arc<dyn Counter>,
        cancel: CancelToken,
    ) -> Result<InputStream> {
        log_output_debug!(
            "Open input",
            id = self.profile.id.as_str(),
            path = fragment.path(),
            offset = fragment.offset(),
            size = fragment.size()
        );
        Ok(open_range(
            self.store.as_ref(),
            Path::new(fragment.path()),
            fragment.offset(),
            fragment.size(),
            counter,
            cancel,
        )?)
    }

    /// Entries below `<fs_path>/<base_path>`, without the temporary area.
    ///
    /// `counter` receives one unit per entry.
    #[instrument(skip(self, counter), level = "debug")]
    pub fn list(&self, base_path: &str, counter: &dyn Counter) -> Result<Vec<FileStatus>> {
        let base = self.production_path(base_path)?;
        let results: Vec<FileStatus> = self
            .store
            .list(&base, true)?
            .into_iter()
            .filter(|s| s.path != self.profile.fs_path && !self.is_temporary(&s.path))
            .collect();
        counter.add(results.len() as u64);
        Ok(results)
    }

    /// Delete production entries below `<fs_path>/<base_path>`.
    ///
    /// Without `recursive` only the files directly below the base are
    /// removed and directories are skipped. With `recursive` the whole tree
    /// goes, except the temporary area and the directories leading to it.
    /// Returns false if any deletion reported nothing to delete.
    #[instrument(skip(self, counter), level = "debug")]
    pub fn delete(&self, base_path: &str, recursive: bool, counter: &dyn Counter) -> Result<bool> {
        let base = self.production_path(base_path)?;
        if self.is_temporary(&base) {
            return Err(OutputError::InvalidArgument(format!(
                "refusing to delete inside the temporary area: {:?}",
                base_path
            )));
        }
        let candidates = self.store.list(&base, recursive)?;
        let targets = if recursive {
            self.minimal_cover(candidates)
        } else {
            candidates
                .into_iter()
                .filter(|s| {
                    if s.is_dir {
                        log_output_debug!(
                            "Skip deleting directory",
                            id = self.profile.id.as_str(),
                            path = display(s.path.display())
                        );
                    }
                    !s.is_dir && !self.is_temporary(&s.path)
                })
                .collect()
        };

        let mut succeed = true;
        for target in &targets {
            log_output_trace!(
                "Deleting file",
                id = self.profile.id.as_str(),
                path = display(target.path.display()),
                recursive = recursive
            );
            counter.add(1);
            if !self.store.delete(&target.path, recursive)? {
                log_output_warn!(
                    "Nothing to delete",
                    id = self.profile.id.as_str(),
                    path = display(target.path.display())
                );
                succeed = false;
            }
        }
        Ok(succeed)
    }

    /// Topmost entries whose subtree does not hold the temporary area.
    ///
    /// `stats` must be sorted by path so parents precede their children.
    fn minimal_cover(&self, stats: Vec<FileStatus>) -> Vec<FileStatus> {
        let temp = &self.profile.temp_path;
        let mut results: Vec<FileStatus> = Vec::new();
        for stat in stats {
            if self.is_temporary(&stat.path) || stat.path == self.profile.fs_path {
                continue;
            }
            if results.iter().any(|kept| stat.path.starts_with(&kept.path)) {
                continue;
            }
            if stat.is_dir && temp.starts_with(&stat.path) {
                // its other children are considered one by one
                continue;
            }
            results.push(stat);
        }
        results
    }
}
