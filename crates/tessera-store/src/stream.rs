//! Stream adapters reporting bytes to a [`Counter`] and honoring a [`CancelToken`].

use std::io::{self, Read, Take, Write};
use std::path::Path;
use std::sync::Arc;

use crate::{CancelToken, Counter, FileStore, Result, StoreError};

/// Writer reporting every written byte.
///
/// Each `write` call checks the cancel token first, so a cancelled job stops
/// at the next chunk boundary.
pub struct CountingWriter<W> {
    inner: W,
    counter: Arc<dyn Counter>,
    cancel: CancelToken,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W, counter: Arc<dyn Counter>, cancel: CancelToken) -> Self {
        Self {
            inner,
            counter,
            cancel,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::cancelled_io());
        }
        let n = self.inner.write(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader reporting every byte read
pub struct CountingReader<R> {
    inner: R,
    counter: Arc<dyn Counter>,
    cancel: CancelToken,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, counter: Arc<dyn Counter>, cancel: CancelToken) -> Self {
        Self {
            inner,
            counter,
            cancel,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::cancelled_io());
        }
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// Open `size` bytes of `path` starting at `offset`.
pub fn open_range(
    store: &dyn FileStore,
    path: &Path,
    offset: u64,
    size: u64,
    counter: Arc<dyn Counter>,
    cancel: CancelToken,
) -> Result<CountingReader<Take<Box<dyn Read + Send>>>> {
    cancel.check()?;
    let input = store.open(path, offset)?;
    Ok(CountingReader::new(input.take(size), counter, cancel))
}
