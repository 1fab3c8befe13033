use std::fs;
use std::fs::File;
use std::io::Take;
use std::path::Path;

use tracing::{info, warn};

use super::index::Index;
use super::manager::LogOptions;
use super::record::Record;
use super::store::Store;
use crate::error::{LogError, LogResult};

/// A bounded unit of the log: one store plus one index, owning the
/// contiguous offset range `[base_offset, next_offset)`.
pub(crate) struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    options: LogOptions,
}

impl Segment {
    /// Opens the segment's file pair under `dir`, creating them if absent.
    ///
    /// Recovery rule: a non-empty index puts `next_offset` one past its last
    /// relative offset; an empty one starts it at `base_offset`.
    pub fn open(dir: &Path, base_offset: u64, options: LogOptions) -> LogResult<Self> {
        let store = Store::open(dir.join(format!("{}.store", base_offset)))?;
        let index = Index::open(
            dir.join(format!("{}.index", base_offset)),
            options.max_index_bytes,
        )?;

        let next_offset = match index.last_entry() {
            Some((relative, _)) => base_offset + u64::from(relative) + 1,
            None => base_offset,
        };

        info!(
            "Opened segment: base_offset={}, next_offset={}",
            base_offset, next_offset
        );

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            options,
        })
    }

    /// Appends one record, returning its assigned offset. `next_offset` only
    /// advances after both the store append and the index write succeed.
    pub fn append(&mut self, mut record: Record) -> LogResult<u64> {
        let offset = self.next_offset;
        record.offset = offset;

        let encoded = record.serialize()?;
        let (_, position) = self.store.append(&encoded)?;
        // Index offsets are relative to the base offset.
        self.index
            .write((offset - self.base_offset) as u32, position)?;

        if self.options.sync_on_write {
            self.store.sync()?;
        }
        self.next_offset += 1;
        Ok(offset)
    }

    /// Reads the record stored at the given logical offset.
    pub fn read(&self, offset: u64) -> LogResult<Record> {
        let relative = offset
            .checked_sub(self.base_offset)
            .ok_or(LogError::OffsetOutOfRange(offset))?;
        let (_, position) = self.index.read(relative as u32).map_err(|e| match e {
            // Report the logical offset, not the segment-relative one.
            LogError::OffsetOutOfRange(_) => LogError::OffsetOutOfRange(offset),
            other => other,
        })?;

        let encoded = self.store.read(position)?;
        Record::deserialize(&encoded)
    }

    /// True once either the store or the index has exhausted its configured
    /// capacity; whichever fills first forces rotation.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.options.max_store_bytes || self.index.is_maxed()
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Highest offset stored in this segment, if any record was ever
    /// appended to it.
    pub fn highest_offset(&self) -> Option<u64> {
        (self.next_offset > self.base_offset).then(|| self.next_offset - 1)
    }

    /// Raw store bytes for log-wide streaming reads.
    pub fn store_reader(&self) -> LogResult<Take<File>> {
        self.store.reader()
    }

    pub fn close(self) -> LogResult<()> {
        self.index.close()?;
        self.store.close()
    }

    /// Closes the segment and deletes both backing files.
    pub fn remove(self) -> LogResult<()> {
        let index_path = self.index.path().to_path_buf();
        let store_path = self.store.path().to_path_buf();
        self.close()?;

        fs::remove_file(&index_path).map_err(|e| {
            warn!("Failed to remove index file {:?}: {}", index_path, e);
            LogError::io("remove index", &index_path, e)
        })?;
        fs::remove_file(&store_path).map_err(|e| {
            warn!("Failed to remove store file {:?}: {}", store_path, e);
            LogError::io("remove store", &store_path, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_options() -> LogOptions {
        LogOptions {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
            ..LogOptions::default()
        }
    }

    #[test]
    fn test_append_read() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::open(dir.path(), 16, test_options()).unwrap();

        assert_eq!(segment.next_offset(), 16);
        assert_eq!(segment.highest_offset(), None);

        for i in 0..3u64 {
            let offset = segment.append(Record::new(format!("value_{}", i))).unwrap();
            assert_eq!(offset, 16 + i);
        }
        assert_eq!(segment.highest_offset(), Some(18));

        for i in 0..3u64 {
            let record = segment.read(16 + i).unwrap();
            assert_eq!(record.offset, 16 + i);
            assert_eq!(record.value, format!("value_{}", i).into_bytes());
        }
    }

    #[test]
    fn test_read_out_of_range() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::open(dir.path(), 16, test_options()).unwrap();
        segment.append(Record::new("only")).unwrap();

        // Below the base and at next_offset are both out of range.
        assert!(matches!(
            segment.read(15),
            Err(LogError::OffsetOutOfRange(15))
        ));
        assert!(matches!(
            segment.read(17),
            Err(LogError::OffsetOutOfRange(17))
        ));
    }

    #[test]
    fn test_recovers_next_offset() {
        let dir = TempDir::new().unwrap();

        {
            let mut segment = Segment::open(dir.path(), 16, test_options()).unwrap();
            for _ in 0..4 {
                segment.append(Record::new("persisted")).unwrap();
            }
            segment.close().unwrap();
        }

        let segment = Segment::open(dir.path(), 16, test_options()).unwrap();
        assert_eq!(segment.next_offset(), 20);
        assert_eq!(segment.read(19).unwrap().value, b"persisted");
    }

    #[test]
    fn test_is_maxed_by_index() {
        let dir = TempDir::new().unwrap();
        let options = LogOptions {
            max_index_bytes: 2 * crate::log::ENT_WIDTH,
            ..test_options()
        };

        let mut segment = Segment::open(dir.path(), 0, options).unwrap();
        assert!(!segment.is_maxed());
        segment.append(Record::new("a")).unwrap();
        segment.append(Record::new("b")).unwrap();
        assert!(segment.is_maxed());
    }

    #[test]
    fn test_is_maxed_by_store() {
        let dir = TempDir::new().unwrap();
        let options = LogOptions {
            max_store_bytes: 32,
            ..test_options()
        };

        let mut segment = Segment::open(dir.path(), 0, options).unwrap();
        segment.append(Record::new(vec![0u8; 64])).unwrap();
        assert!(segment.is_maxed());
    }

    #[test]
    fn test_remove_deletes_files() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::open(dir.path(), 0, test_options()).unwrap();
        segment.append(Record::new("gone")).unwrap();

        let store_path = segment.store.path().to_path_buf();
        let index_path = segment.index.path().to_path_buf();
        segment.remove().unwrap();

        assert!(!store_path.exists());
        assert!(!index_path.exists());
    }
}
