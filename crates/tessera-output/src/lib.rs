//! # tessera-output
//!
//! Staged transactional output for direct file I/O.
//!
//! Attempts write into private directories. Committed attempts are moved
//! into a per-transaction staging area, and the transaction commit moves
//! staging into production. A commit marker records which transactions are
//! still in doubt, so [`TransactionRecoveryCoordinator`] can finish or roll
//! them back after a crash.
//!
//! ## Architecture
//!
//! ```text
//! DataSourceRepository ── container path → DataSourceProvider → StagedOutput
//!                                                                  │
//! TransactionRecoveryCoordinator ── CommitMarkerStore              │
//!          │                                                       ▼
//!          └── apply / abort ───────────────────────────► BulkMover (rayon)
//! ```
//!
//! ## Protocol
//!
//! 1. Create the commit marker, then `setup_transaction` on each data source.
//! 2. Per attempt: `setup_attempt`, `open_output`..., then `commit_attempt`
//!    or `cleanup_attempt`.
//! 3. `commit_transaction` and `cleanup_transaction` on each data source
//!    (or let [`TransactionRecoveryCoordinator::apply`] do it), then delete
//!    the marker.

pub mod context;
pub mod error;
pub mod marker;
pub mod mover;
pub mod profile;
pub mod recovery;
pub mod repository;
pub mod staged;

pub use context::{AttemptContext, TransactionContext};
pub use error::{InstanceFailure, OutputError, Result};
pub use marker::{CommitMarkerStore, TransactionInfo};
pub use mover::{BulkMover, MoveStats};
pub use profile::{default_thread_count, DataSourceProfile, MAX_MOVE_THREADS};
pub use recovery::TransactionRecoveryCoordinator;
pub use repository::{DataSourceProvider, DataSourceRepository, ProfileProvider};
pub use staged::{InputStream, OutputStream, StagedOutput};
