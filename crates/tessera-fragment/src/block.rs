//! Block placement hints and the normalized per-file block map.

use std::collections::HashMap;

/// One physical block placement hint: `[start, end)` stored on `hosts`.
///
/// Hosts are kept sorted and deduplicated, so two blocks held by the same
/// set of hosts compare equal no matter how the storage listed them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    start: u64,
    end: u64,
    hosts: Vec<String>,
}

impl BlockInfo {
    /// Create a block. An `end` before `start` collapses to an empty block.
    pub fn new<I, S>(start: u64, end: u64, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
        hosts.sort();
        hosts.dedup();
        Self {
            start,
            end: end.max(start),
            hosts,
        }
    }

    /// Block with no known owner.
    pub fn hostless(start: u64, end: u64) -> Self {
        Self::new(start, end, std::iter::empty::<String>())
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Whether both blocks are owned by the same host set
    pub fn same_owners(&self, other: &BlockInfo) -> bool {
        self.hosts == other.hosts
    }

    /// Same owners over a different range
    fn with_range(&self, start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            hosts: self.hosts.clone(),
        }
    }
}

/// Contiguous `[start, end)` range of blocks grouped for splitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub start: u64,
    pub end: u64,
}

impl Group {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// Normalized block layout of one file.
///
/// Blocks are ordered, non-overlapping and contiguous:
/// `blocks[i].end() == blocks[i + 1].start()`. Gaps the storage did not
/// report are covered by hostless blocks, so the map spans `[0, file_size)`.
#[derive(Debug, Clone)]
pub struct BlockMap {
    path: String,
    blocks: Vec<BlockInfo>,
}

impl BlockMap {
    /// Normalize raw hints into a block map covering `[0, file_size)`.
    ///
    /// Hints may be unsorted, overlapping or partially outside the file.
    /// On overlap the block that starts first wins; among blocks starting at
    /// the same offset the one with more hosts wins. When `combine` is set,
    /// neighbours with the same owners are merged afterwards.
    pub fn create(path: &str, file_size: u64, hints: Vec<BlockInfo>, combine: bool) -> Self {
        let mut hints = hints;
        hints.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| b.hosts.len().cmp(&a.hosts.len()))
        });

        let mut blocks = Vec::with_capacity(hints.len() + 1);
        let mut cursor = 0u64;
        for hint in &hints {
            let start = hint.start.max(cursor);
            let end = hint.end.min(file_size);
            if start >= end {
                continue;
            }
            if start > cursor {
                blocks.push(BlockInfo::hostless(cursor, start));
            }
            blocks.push(hint.with_range(start, end));
            cursor = end;
        }
        if cursor < file_size {
            blocks.push(BlockInfo::hostless(cursor, file_size));
        }

        let blocks = if combine {
            Self::compact(blocks)
        } else {
            blocks
        };
        Self {
            path: path.to_string(),
            blocks,
        }
    }

    fn compact(blocks: Vec<BlockInfo>) -> Vec<BlockInfo> {
        let mut results: Vec<BlockInfo> = Vec::with_capacity(blocks.len());
        for block in blocks {
            match results.last_mut() {
                Some(last) if last.same_owners(&block) && last.end == block.start => {
                    last.end = block.end;
                }
                _ => results.push(block),
            }
        }
        results
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// Total bytes covered by the map
    pub fn size(&self) -> u64 {
        match (self.blocks.first(), self.blocks.last()) {
            (Some(first), Some(last)) => last.end - first.start,
            _ => 0,
        }
    }

    /// Iterate groups of whole blocks, each at least `min_size` bytes long.
    pub fn groups(&self, min_size: u64) -> Groups<'_> {
        Groups {
            blocks: &self.blocks,
            index: 0,
            min_size,
        }
    }

    /// Hosts owning a meaningful share of `[start, end)`.
    ///
    /// Bytes are summed per host over every intersecting block. When the
    /// best host holds less than 1/8 of the range nobody owns it. Otherwise
    /// every host holding at least 3/4 of the best host's bytes is returned,
    /// most bytes first, ties broken by host name.
    pub fn owners(&self, start: u64, end: u64) -> Vec<String> {
        if start >= end {
            return Vec::new();
        }
        let first = self.blocks.partition_point(|b| b.end <= start);
        let mut bytes: HashMap<&str, u64> = HashMap::new();
        for block in self.blocks[first..].iter().take_while(|b| b.start < end) {
            let overlap = block.end.min(end) - block.start.max(start);
            for host in &block.hosts {
                *bytes.entry(host.as_str()).or_insert(0) += overlap;
            }
        }

        let mut ranked: Vec<(&str, u64)> = bytes.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let Some(&(_, top)) = ranked.first() else {
            return Vec::new();
        };
        let size = u128::from(end - start);
        let top = u128::from(top);
        if top * 8 < size {
            return Vec::new();
        }
        ranked
            .into_iter()
            .take_while(|&(_, b)| u128::from(b) * 4 >= top * 3)
            .map(|(host, _)| host.to_string())
            .collect()
    }
}

/// Iterator over [`Group`]s of a block slice.
///
/// A group grows block by block until it reaches `min_size`. If what is
/// left afterwards would be smaller than `min_size`, the group absorbs it.
pub struct Groups<'a> {
    blocks: &'a [BlockInfo],
    index: usize,
    min_size: u64,
}

impl Iterator for Groups<'_> {
    type Item = Group;

    fn next(&mut self) -> Option<Group> {
        let first = self.blocks.get(self.index)?;
        let last_end = self.blocks.last()?.end;
        let start = first.start;
        let mut end = start;
        while let Some(block) = self.blocks.get(self.index) {
            end = block.end;
            self.index += 1;
            if end - start >= self.min_size {
                break;
            }
        }
        if last_end - end < self.min_size {
            end = last_end;
            self.index = self.blocks.len();
        }
        Some(Group { start, end })
    }
}
