//! # tessera-fragment
//!
//! Splits a file into contiguous byte-range work units ("fragments") sized
//! for parallel processing, using the storage's block-placement hints to
//! keep each fragment close to the hosts that hold most of its bytes.
//!
//! ## Pipeline
//!
//! ```text
//! hints ──normalize──▶ BlockMap ──compact──▶ groups (>= min) ──split (~pref)──▶ fragments
//!                                                                  │
//!                                                   owners ◀── locality
//! ```
//!
//! Everything here is pure: no I/O, no shared state.

mod block;
mod computer;

pub use block::{BlockInfo, BlockMap, Group, Groups};
pub use computer::{Fragment, FragmentComputer, MAX_MIN_SIZE};

use tessera_config::ErrorKind;
use thiserror::Error;

/// Errors raised while planning fragments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("fragments of {path} do not tile the file: {detail}")]
    TilingViolated { path: String, detail: String },
}

impl FragmentError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

pub type Result<T> = std::result::Result<T, FragmentError>;
