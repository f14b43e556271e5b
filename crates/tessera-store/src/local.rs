//! Local filesystem backend.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

use tessera_fragment::BlockInfo;
use tracing::instrument;
use walkdir::WalkDir;

use crate::{FileStatus, FileStore, Result, StoreError};

/// Host reported for blocks when no host list is configured
pub const DEFAULT_HOST: &str = "localhost";

/// [`FileStore`] over `std::fs`.
///
/// A local disk has no real block placement, so it is synthesized: files
/// are cut into `block_size` blocks assigned round-robin to `hosts`. Without
/// a block size each file is a single block.
#[derive(Debug, Clone)]
pub struct LocalStore {
    block_size: Option<u64>,
    hosts: Vec<String>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            block_size: None,
            hosts: vec![DEFAULT_HOST.to_string()],
        }
    }

    /// Synthesize placement with fixed-size blocks spread over `hosts`.
    pub fn with_placement<I, S>(block_size: u64, hosts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if block_size == 0 {
            return Err(StoreError::InvalidArgument(
                "block size must be > 0".to_string(),
            ));
        }
        let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
        Ok(Self {
            block_size: Some(block_size),
            hosts,
        })
    }

    fn to_status(path: &Path, meta: &fs::Metadata) -> FileStatus {
        FileStatus {
            path: path.to_path_buf(),
            len: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            modified: meta.modified().ok(),
        }
    }

    fn host_for(&self, index: u64) -> Vec<String> {
        if self.hosts.is_empty() {
            return Vec::new();
        }
        let i = (index % self.hosts.len() as u64) as usize;
        vec![self.hosts[i].clone()]
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl FileStore for LocalStore {
    #[instrument(skip(self), level = "debug")]
    fn list(&self, path: &Path, recursive: bool) -> Result<Vec<FileStatus>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            return Ok(vec![Self::to_status(path, &meta)]);
        }

        let walker = WalkDir::new(path)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();
        let mut results = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => StoreError::Io(io),
                None => StoreError::InvalidArgument(format!(
                    "filesystem loop below {}",
                    path.display()
                )),
            })?;
            let meta = entry.metadata().map_err(|e| match e.into_io_error() {
                Some(io) => StoreError::Io(io),
                None => StoreError::NotFound {
                    path: path.to_path_buf(),
                },
            })?;
            results.push(Self::to_status(entry.path(), &meta));
        }
        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    fn status(&self, path: &Path) -> Result<Option<FileStatus>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::to_status(path, &meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn block_placement(&self, path: &Path, range: Range<u64>) -> Result<Vec<BlockInfo>> {
        let len = match self.status(path)? {
            Some(status) if !status.is_dir => status.len,
            _ => {
                return Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                })
            }
        };
        let start = range.start.min(len);
        let end = range.end.min(len);
        if start >= end {
            return Ok(Vec::new());
        }

        let Some(block_size) = self.block_size else {
            return Ok(vec![BlockInfo::new(0, len, self.host_for(0))]);
        };
        let first = start / block_size;
        let last = (end - 1) / block_size;
        Ok((first..=last)
            .map(|i| {
                let block_start = i * block_size;
                let block_end = (block_start + block_size).min(len);
                BlockInfo::new(block_start, block_end, self.host_for(i))
            })
            .collect())
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        Self::ensure_parent(path)?;
        let file = File::create(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn create_new(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        Self::ensure_parent(path)?;
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn open(&self, path: &Path, offset: u64) -> Result<Box<dyn Read + Send>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(Box::new(BufReader::new(file)))
    }

    #[instrument(skip(self), level = "debug")]
    fn rename(&self, from: &Path, to: &Path) -> Result<bool> {
        if fs::symlink_metadata(from).is_err() {
            return Ok(false);
        }
        fs::rename(from, to)?;
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, path: &Path, recursive: bool) -> Result<bool> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            fs::remove_file(path)?;
        } else if recursive {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_dir(path)?;
        }
        Ok(true)
    }

    fn mkdirs(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }
}
