use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::warn;

use crate::error::{LogError, LogResult};

/// Width of the segment-relative offset column.
pub const OFF_WIDTH: u64 = 4;
/// Width of the store-position column.
pub const POS_WIDTH: u64 = 8;
/// Width of one index entry: `[4-byte BE relative offset][8-byte BE position]`.
pub const ENT_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

/// Fixed-width mapping from a segment-relative offset to a byte position in
/// the segment's store.
///
/// The backing file is grown to its configured capacity at open and memory
/// mapped, so writes land directly in the mapped region. On close the file is
/// truncated back down to the bytes actually used; a reopened index recomputes
/// its entry count from the on-disk file length.
pub struct Index {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    size: u64,
}

impl Index {
    pub fn open(path: impl Into<PathBuf>, max_index_bytes: u64) -> LogResult<Self> {
        let path = path.into();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to open index file {:?}: {}", path, e);
                LogError::io("open index", &path, e)
            })?;

        // The on-disk length is the real content size; the file was truncated
        // down to it when last closed.
        let size = file
            .metadata()
            .map_err(|e| LogError::io("stat index", &path, e))?
            .len();

        file.set_len(max_index_bytes)
            .map_err(|e| LogError::io("grow index", &path, e))?;
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| LogError::io("mmap index", &path, e))?;

        Ok(Self {
            path,
            file,
            mmap,
            size,
        })
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> u64 {
        self.size / ENT_WIDTH
    }

    /// Appends one entry. Fails with `IndexFull` when the mapped region has
    /// no room left; the segment's max-size check rotates before that.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> LogResult<()> {
        if self.size + ENT_WIDTH > self.mmap.len() as u64 {
            return Err(LogError::IndexFull);
        }
        let at = self.size as usize;
        self.mmap[at..at + OFF_WIDTH as usize].copy_from_slice(&relative_offset.to_be_bytes());
        self.mmap[at + OFF_WIDTH as usize..at + ENT_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());
        self.size += ENT_WIDTH;
        Ok(())
    }

    /// Returns the n-th entry by write order. Entries are appended with
    /// strictly increasing relative offsets starting at 0, so position n
    /// holds relative offset n.
    pub fn read(&self, n: u32) -> LogResult<(u32, u64)> {
        if u64::from(n) >= self.entries() {
            return Err(LogError::OffsetOutOfRange(u64::from(n)));
        }
        Ok(self.entry_at(u64::from(n)))
    }

    /// Last written entry, or `None` for an empty index. Recovery uses this
    /// to recompute a segment's next offset; emptiness is a normal outcome
    /// there, not an error.
    pub fn last_entry(&self) -> Option<(u32, u64)> {
        match self.entries() {
            0 => None,
            n => Some(self.entry_at(n - 1)),
        }
    }

    fn entry_at(&self, n: u64) -> (u32, u64) {
        let at = (n * ENT_WIDTH) as usize;
        let mut off = [0u8; OFF_WIDTH as usize];
        off.copy_from_slice(&self.mmap[at..at + OFF_WIDTH as usize]);
        let mut pos = [0u8; POS_WIDTH as usize];
        pos.copy_from_slice(&self.mmap[at + OFF_WIDTH as usize..at + ENT_WIDTH as usize]);
        (u32::from_be_bytes(off), u64::from_be_bytes(pos))
    }

    /// True when there is no room for another entry.
    pub fn is_maxed(&self) -> bool {
        self.size + ENT_WIDTH > self.mmap.len() as u64
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the mapped region and truncates the file to its content size,
    /// discarding the preallocated padding.
    pub fn close(self) -> LogResult<()> {
        let Index {
            path,
            file,
            mmap,
            size,
        } = self;

        mmap.flush().map_err(|e| {
            warn!("Failed to flush index {:?}: {}", path, e);
            LogError::io("flush index", &path, e)
        })?;
        drop(mmap);

        file.set_len(size)
            .map_err(|e| LogError::io("truncate index", &path, e))?;
        file.sync_all()
            .map_err(|e| LogError::io("sync index", &path, e))
    }
}
