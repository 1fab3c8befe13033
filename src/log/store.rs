use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Take, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{LogError, LogResult};

/// Width of the big-endian length prefix framing every record.
pub const LEN_WIDTH: u64 = 8;

struct StoreInner {
    writer: BufWriter<File>,
    reader: File,
    size: u64,
}

/// Append-only byte container for one segment.
///
/// Frames each record as `[8-byte big-endian length][payload]` with no gaps.
/// Writes go through a buffered tail; positional reads force a flush first so
/// they observe every previously acknowledged append. `size` is authoritative
/// even while bytes are still buffered.
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>) -> LogResult<Self> {
        let path = path.into();

        let write_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to open store file {:?}: {}", path, e);
                LogError::io("open store", &path, e)
            })?;
        let reader = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| LogError::io("open store", &path, e))?;
        let size = reader
            .metadata()
            .map_err(|e| LogError::io("stat store", &path, e))?
            .len();

        Ok(Self {
            path,
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(write_file),
                reader,
                size,
            }),
        })
    }

    /// Appends one framed payload, returning `(bytes_written, position)`.
    /// `position` is the byte offset at which the frame begins.
    pub fn append(&self, payload: &[u8]) -> LogResult<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;

        let frame_err = |e: std::io::Error| {
            warn!("Failed to append to store {:?}: {}", self.path, e);
            LogError::io("append to store", &self.path, e)
        };
        inner
            .writer
            .write_all(&(payload.len() as u64).to_be_bytes())
            .map_err(frame_err)?;
        inner.writer.write_all(payload).map_err(frame_err)?;

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;
        Ok((written, position))
    }

    /// Reads the frame beginning at `position`, returning its payload.
    pub fn read(&self, position: u64) -> LogResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner
            .writer
            .flush()
            .map_err(|e| LogError::io("flush store", &self.path, e))?;

        if position.checked_add(LEN_WIDTH).is_none_or(|end| end > inner.size) {
            return Err(LogError::Corruption {
                path: self.path.clone(),
                position,
            });
        }
        let mut len_buf = [0u8; LEN_WIDTH as usize];
        inner
            .reader
            .read_exact_at(&mut len_buf, position)
            .map_err(|e| {
                warn!("Failed to read store {:?} at {}: {}", self.path, position, e);
                LogError::io("read store", &self.path, e)
            })?;

        let len = u64::from_be_bytes(len_buf);
        // Checked arithmetic: a corrupt prefix may claim an absurd length.
        let frame_end = (position + LEN_WIDTH).checked_add(len);
        if frame_end.is_none_or(|end| end > inner.size) {
            return Err(LogError::Corruption {
                path: self.path.clone(),
                position,
            });
        }
        let mut payload = vec![0u8; len as usize];
        inner
            .reader
            .read_exact_at(&mut payload, position + LEN_WIDTH)
            .map_err(|e| {
                warn!("Failed to read store {:?} at {}: {}", self.path, position, e);
                LogError::io("read store", &self.path, e)
            })?;
        Ok(payload)
    }

    /// Current byte length, buffered bytes included.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered writes and syncs file data to disk.
    pub fn sync(&self) -> LogResult<()> {
        let mut inner = self.inner.lock();
        inner
            .writer
            .flush()
            .map_err(|e| LogError::io("flush store", &self.path, e))?;
        inner
            .writer
            .get_ref()
            .sync_data()
            .map_err(|e| LogError::io("sync store", &self.path, e))
    }

    /// Returns a fresh handle reading the raw store bytes from the start,
    /// capped at the current size. Used for log-wide streaming reads.
    pub fn reader(&self) -> LogResult<Take<File>> {
        let mut inner = self.inner.lock();
        inner
            .writer
            .flush()
            .map_err(|e| LogError::io("flush store", &self.path, e))?;
        let file = File::open(&self.path).map_err(|e| LogError::io("open store", &self.path, e))?;
        Ok(file.take(inner.size))
    }

    /// Flushes buffered writes and closes the file.
    pub fn close(self) -> LogResult<()> {
        let Store { path, inner } = self;
        let mut inner = inner.into_inner();
        inner.writer.flush().map_err(|e| {
            warn!("Failed to flush store {:?} on close: {}", path, e);
            LogError::io("flush store", &path, e)
        })
    }
}
