use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;

use crate::{CaptureError, Result};

/// A cheaply cloneable handle to the bytes being recorded. The finalize
/// method for the wav writer does not return the inner data, so we keep it
/// behind an Arc<Mutex> and take it back once the writer is gone.
#[derive(Debug, Clone)]
pub(crate) struct MemoryWriter {
    inner: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl MemoryWriter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cursor::new(Vec::with_capacity(64 * 1024)))),
        }
    }

    /// Take the recorded bytes. Fails while any other clone is alive.
    pub(crate) fn try_into_inner(self) -> Result<Vec<u8>> {
        let owned = Arc::try_unwrap(self.inner).map_err(|_| {
            CaptureError::Anyhow(anyhow!("clip buffer is still shared with a writer"))
        })?;
        Ok(owned.into_inner().into_inner())
    }
}

impl Seek for MemoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}
