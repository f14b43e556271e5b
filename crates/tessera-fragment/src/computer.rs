//! Fragment computation from block placement hints.

use serde::{Deserialize, Serialize};
use tessera_config::{log_fragment_debug, log_fragment_trace, DEFAULT_MIN_FRAGMENT, DEFAULT_PREF_FRAGMENT};
use tracing::instrument;

use crate::block::{BlockInfo, BlockMap, Group};
use crate::{FragmentError, Result};

/// Upper bound for the minimum fragment size.
///
/// Keeps `file_size / 2 < min` and the group arithmetic clear of overflow.
pub const MAX_MIN_SIZE: i64 = i64::MAX / 8;

/// A contiguous byte range of one file, processed as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    path: String,
    offset: u64,
    size: u64,
    owner_hosts: Vec<String>,
}

impl Fragment {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Hosts holding most of this fragment's bytes, best first (may be empty)
    pub fn owner_hosts(&self) -> &[String] {
        &self.owner_hosts
    }
}

/// Plans fragments for files.
///
/// # Example
/// ```
/// use tessera_fragment::{BlockInfo, FragmentComputer};
///
/// let computer = FragmentComputer::new(10, 80, true, true);
/// let fragments = computer
///     .compute_fragments("data/part-0", 400, vec![BlockInfo::new(0, 400, ["a"])])
///     .unwrap();
/// assert_eq!(fragments.len(), 5);
/// assert!(fragments.iter().all(|f| f.size() == 80 && f.owner_hosts() == ["a"]));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentComputer {
    min_size: i64,
    pref_size: u64,
    combine_blocks: bool,
    split_blocks: bool,
}

impl Default for FragmentComputer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FRAGMENT, DEFAULT_PREF_FRAGMENT, true, true)
    }
}

impl FragmentComputer {
    /// Create a computer.
    ///
    /// `min_size <= 0` or `split_blocks == false` yields one fragment per
    /// file. `min_size` is capped at [`MAX_MIN_SIZE`]; `pref_size` is raised
    /// to at least `max(1, min_size)`.
    pub fn new(min_size: i64, pref_size: i64, combine_blocks: bool, split_blocks: bool) -> Self {
        let min_size = min_size.min(MAX_MIN_SIZE);
        let pref_size = pref_size.max(min_size).max(1) as u64;
        Self {
            min_size,
            pref_size,
            combine_blocks,
            split_blocks,
        }
    }

    pub fn min_size(&self) -> i64 {
        self.min_size
    }

    pub fn pref_size(&self) -> u64 {
        self.pref_size
    }

    /// Compute fragments of one file.
    ///
    /// The result is sorted by offset and tiles `[0, file_size)` exactly.
    /// A zero-length file yields one zero-length fragment.
    #[instrument(skip(self, hints), level = "debug")]
    pub fn compute_fragments(
        &self,
        path: &str,
        file_size: u64,
        hints: Vec<BlockInfo>,
    ) -> Result<Vec<Fragment>> {
        if path.is_empty() {
            return Err(FragmentError::InvalidArgument(
                "path must not be empty".to_string(),
            ));
        }
        let map = BlockMap::create(path, file_size, hints, self.combine_blocks);
        for block in map.blocks() {
            log_fragment_trace!(
                "Normalized block",
                path = path,
                start = block.start(),
                end = block.end(),
                hosts = tracing::field::debug(block.hosts())
            );
        }

        let fragments = if file_size == 0 {
            vec![self.fragment(&map, 0, 0)]
        } else if !self.split_blocks || self.min_size <= 0 || file_size / 2 < self.min_size as u64 {
            vec![self.fragment(&map, 0, file_size)]
        } else {
            let mut results = Vec::new();
            for group in self.coalesce(map.groups(self.min_size as u64)) {
                self.split(&map, group, &mut results);
            }
            results
        };

        check_tiling(path, file_size, &fragments)?;
        log_fragment_debug!(
            "Computed fragments",
            path = path,
            size = file_size,
            fragments = fragments.len()
        );
        Ok(fragments)
    }

    /// Merge neighbouring groups while the merged group fits `pref_size`.
    fn coalesce(&self, groups: impl Iterator<Item = Group>) -> Vec<Group> {
        let mut results: Vec<Group> = Vec::new();
        for group in groups {
            match results.last_mut() {
                Some(last) if group.end - last.start <= self.pref_size => last.end = group.end,
                _ => results.push(group),
            }
        }
        results
    }

    fn split(&self, map: &BlockMap, group: Group, results: &mut Vec<Fragment>) {
        let count = (group.size() / self.pref_size).max(1);
        let size = group.size().div_ceil(count);
        let mut offset = group.start;
        while offset < group.end {
            let end = (offset + size).min(group.end);
            results.push(self.fragment(map, offset, end));
            offset = end;
        }
    }

    fn fragment(&self, map: &BlockMap, start: u64, end: u64) -> Fragment {
        Fragment {
            path: map.path().to_string(),
            offset: start,
            size: end - start,
            owner_hosts: map.owners(start, end),
        }
    }
}

fn check_tiling(path: &str, file_size: u64, fragments: &[Fragment]) -> Result<()> {
    let violated = |detail: String| FragmentError::TilingViolated {
        path: path.to_string(),
        detail,
    };
    if fragments.is_empty() {
        return Err(violated("no fragments".to_string()));
    }
    let mut cursor = 0u64;
    for fragment in fragments {
        if fragment.offset != cursor {
            return Err(violated(format!(
                "fragment starts at {} but previous ended at {}",
                fragment.offset, cursor
            )));
        }
        cursor = fragment.end();
    }
    if cursor != file_size {
        return Err(violated(format!(
            "fragments end at {} but file size is {}",
            cursor, file_size
        )));
    }
    Ok(())
}
