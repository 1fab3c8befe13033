//! The log: an ordered list of segments behind one logical offset space.
//!
//! Owns segment lifecycle end to end: recovery from an existing directory,
//! rotation of the active segment, truncation of aged segments, and
//! log-wide streaming reads.

use std::fs::{self, File};
use std::io::{self, Read, Take};
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::record::Record;
use super::segment::Segment;
use crate::error::{LogError, LogResult};

/// Default per-segment store size ceiling.
pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
/// Default per-segment index size ceiling.
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

/// Configuration for a log instance.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    /// Store size ceiling triggering rotation. Zero falls back to the
    /// default.
    pub max_store_bytes: u64,
    /// Index size ceiling triggering rotation. Zero falls back to the
    /// default.
    pub max_index_bytes: u64,
    /// Base offset used when bootstrapping an empty directory.
    pub initial_offset: u64,
    /// Whether to fsync store data after each append.
    pub sync_on_write: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            initial_offset: 0,
            sync_on_write: false,
        }
    }
}

/// A segmented, append-only commit log over one directory.
///
/// Segments are kept sorted ascending by base offset with contiguous,
/// non-overlapping ranges; the last segment is the active one and the only
/// append target. Appends, rotation, and truncation take the exclusive
/// lock; reads take the shared lock and proceed in parallel.
pub struct Log {
    dir: PathBuf,
    options: LogOptions,
    // Invariant: never empty; the last segment is the active one.
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Opens the log, recovering every segment file pair found under `dir`.
    ///
    /// Base offsets are parsed from file stems; files that are not
    /// `<offset>.store` / `<offset>.index` are ignored. An empty directory
    /// gets one fresh segment at the configured initial offset. The first
    /// segment that fails to load aborts recovery with the wrapped error.
    pub fn open(dir: impl Into<PathBuf>, mut options: LogOptions) -> LogResult<Self> {
        let dir = dir.into();
        if options.max_store_bytes == 0 {
            options.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if options.max_index_bytes == 0 {
            options.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }

        fs::create_dir_all(&dir).map_err(|e| {
            warn!("Failed to create log directory {:?}: {}", dir, e);
            LogError::io("create log directory", &dir, e)
        })?;

        let mut base_offsets = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| LogError::Recovery {
            dir: dir.clone(),
            source: Box::new(LogError::io("read log directory", &dir, e)),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| LogError::Recovery {
                dir: dir.clone(),
                source: Box::new(LogError::io("read log directory", &dir, e)),
            })?;
            let path = entry.path();
            let is_segment_file = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("store") | Some("index")
            );
            if !is_segment_file {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Ok(base_offset) = stem.parse::<u64>() else {
                continue;
            };
            base_offsets.push(base_offset);
        }
        // Each segment contributes a store and an index file.
        base_offsets.sort_unstable();
        base_offsets.dedup();

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            let segment = Segment::open(&dir, base_offset, options).map_err(|e| {
                warn!(
                    "Failed to recover segment {} in {:?}: {}",
                    base_offset, dir, e
                );
                LogError::Recovery {
                    dir: dir.clone(),
                    source: Box::new(e),
                }
            })?;
            segments.push(segment);
        }
        if segments.is_empty() {
            let segment =
                Segment::open(&dir, options.initial_offset, options).map_err(|e| {
                    LogError::Recovery {
                        dir: dir.clone(),
                        source: Box::new(e),
                    }
                })?;
            segments.push(segment);
        }

        info!("Opened log at {:?}: {} segment(s)", dir, segments.len());

        Ok(Self {
            dir,
            options,
            segments: RwLock::new(segments),
        })
    }

    /// Appends a record to the active segment, returning its assigned
    /// offset. Rotates to a fresh segment once the active one is maxed.
    pub fn append(&self, record: Record) -> LogResult<u64> {
        let mut segments = self.segments.write();
        let active = segments
            .last_mut()
            .expect("log always has an active segment");

        let offset = active.append(record)?;
        if active.is_maxed() {
            let segment = Segment::open(&self.dir, offset + 1, self.options)?;
            info!("Rotated to new segment: base_offset={}", offset + 1);
            segments.push(segment);
        }
        Ok(offset)
    }

    /// Reads the record at `offset` from whichever segment owns it.
    pub fn read(&self, offset: u64) -> LogResult<Record> {
        let segments = self.segments.read();
        // Segments are sorted by base offset: the owner is the last one
        // whose base does not exceed the requested offset.
        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        if idx == 0 {
            return Err(LogError::OffsetOutOfRange(offset));
        }
        let segment = &segments[idx - 1];
        if offset >= segment.next_offset() {
            return Err(LogError::OffsetOutOfRange(offset));
        }
        segment.read(offset)
    }

    /// Base offset of the oldest segment.
    pub fn lowest_offset(&self) -> u64 {
        let segments = self.segments.read();
        segments
            .first()
            .expect("log always has an active segment")
            .base_offset()
    }

    /// Offset of the newest stored record, or `None` when the log holds no
    /// records at all.
    pub fn highest_offset(&self) -> Option<u64> {
        let segments = self.segments.read();
        let last = segments
            .last()
            .expect("log always has an active segment");
        if segments.len() == 1 && last.next_offset() == last.base_offset() {
            return None;
        }
        // A freshly rotated active segment has next_offset == base_offset;
        // next_offset - 1 still names the newest record, in the segment
        // before it.
        Some(last.next_offset() - 1)
    }

    /// Removes every segment whose highest stored offset is below `lowest`,
    /// deleting its files. The active segment is always preserved so the log
    /// keeps a writable target.
    pub fn truncate(&self, lowest: u64) -> LogResult<()> {
        let mut segments = self.segments.write();
        while segments.len() > 1 {
            let removable = match segments[0].highest_offset() {
                Some(highest) => highest < lowest,
                None => true,
            };
            if !removable {
                break;
            }
            let segment = segments.remove(0);
            info!(
                "Truncating segment below offset {}: base_offset={}",
                lowest,
                segment.base_offset()
            );
            segment.remove()?;
        }
        Ok(())
    }

    /// Returns a reader over the raw store bytes of every segment in base
    /// offset order, length prefixes included - the exact on-disk frame
    /// format. The shared lock is held only while snapshotting the segment
    /// list; a segment truncated away mid-stream surfaces as a read error.
    pub fn reader(&self) -> LogResult<LogReader> {
        let segments = self.segments.read();
        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments.iter() {
            parts.push(segment.store_reader()?);
        }
        Ok(LogReader {
            parts: parts.into_iter(),
            current: None,
        })
    }

    /// Number of live segments, the active one included.
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Closes every segment, attempting all of them and reporting the first
    /// error encountered.
    pub fn close(self) -> LogResult<()> {
        let segments = self.segments.into_inner();
        let mut first_err = None;
        for segment in segments {
            if let Err(e) = segment.close() {
                warn!("Failed to close segment: {}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Streaming reader concatenating the store files of every segment.
pub struct LogReader {
    parts: std::vec::IntoIter<Take<File>>,
    current: Option<Take<File>>,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let Some(part) = self.current.as_mut() else {
                match self.parts.next() {
                    Some(next) => {
                        self.current = Some(next);
                        continue;
                    }
                    None => return Ok(0),
                }
            };
            let n = part.read(buf)?;
            if n == 0 && !buf.is_empty() {
                // Current part exhausted; move on to the next segment.
                self.current = None;
                continue;
            }
            return Ok(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ENT_WIDTH;
    use tempfile::TempDir;

    fn open_log(dir: &TempDir, options: LogOptions) -> Log {
        Log::open(dir.path(), options).unwrap()
    }

    /// One record per segment: the index fills after a single entry.
    fn segment_per_record_options() -> LogOptions {
        LogOptions {
            max_index_bytes: ENT_WIDTH,
            ..LogOptions::default()
        }
    }

    #[test]
    fn test_open_empty_directory() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir, LogOptions::default());

        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), None);
    }

    #[test]
    fn test_rotation_preserves_reads() {
        let dir = TempDir::new().unwrap();
        let log = open_log(
            &dir,
            LogOptions {
                max_store_bytes: 32,
                ..LogOptions::default()
            },
        );

        for i in 0..10u64 {
            let offset = log.append(Record::new(format!("record_{}", i))).unwrap();
            assert_eq!(offset, i);
        }
        assert!(log.segment_count() > 1);

        // Reads across every rotation boundary still succeed.
        for i in 0..10u64 {
            let record = log.read(i).unwrap();
            assert_eq!(record.offset, i);
            assert_eq!(record.value, format!("record_{}", i).into_bytes());
        }
    }

    #[test]
    fn test_rotation_base_offset_follows_last_record() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir, segment_per_record_options());

        log.append(Record::new("a")).unwrap();
        log.append(Record::new("b")).unwrap();

        let segments = log.segments.read();
        let bases: Vec<u64> = segments.iter().map(|s| s.base_offset()).collect();
        assert_eq!(bases, vec![0, 1, 2]);
    }

    #[test]
    fn test_truncate_removes_aged_segments() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir, segment_per_record_options());

        for _ in 0..3 {
            log.append(Record::new("hello")).unwrap();
        }
        assert_eq!(log.segment_count(), 4);

        log.truncate(1).unwrap();

        assert_eq!(log.lowest_offset(), 1);
        assert!(matches!(log.read(0), Err(LogError::OffsetOutOfRange(0))));
        assert_eq!(log.read(1).unwrap().value, b"hello");
        assert_eq!(log.read(2).unwrap().value, b"hello");
    }

    #[test]
    fn test_truncate_never_removes_active_segment() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir, segment_per_record_options());

        for _ in 0..3 {
            log.append(Record::new("hello")).unwrap();
        }

        // Well past every stored offset: everything but the active segment
        // goes, and the log stays writable.
        log.truncate(100).unwrap();
        assert_eq!(log.segment_count(), 1);

        let offset = log.append(Record::new("after")).unwrap();
        assert_eq!(offset, 3);
        assert_eq!(log.read(3).unwrap().value, b"after");
    }

    #[test]
    fn test_truncate_noop_when_colocated() {
        let dir = TempDir::new().unwrap();
        // Default ceilings: all records land in one not-yet-maxed segment.
        let log = open_log(&dir, LogOptions::default());

        for _ in 0..3 {
            log.append(Record::new("hello")).unwrap();
        }
        log.truncate(1).unwrap();

        // No segment qualified for removal, so offset 0 stays readable.
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.read(0).unwrap().offset, 0);
    }

    #[test]
    fn test_recovery_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a segment").unwrap();
        std::fs::write(dir.path().join("orphan.dat"), b"ignored").unwrap();

        let log = open_log(&dir, LogOptions::default());
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset(), 0);
    }

    #[test]
    fn test_close_then_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let options = LogOptions {
            max_store_bytes: 32,
            ..LogOptions::default()
        };

        let log = open_log(&dir, options);
        for i in 0..5u64 {
            log.append(Record::new(format!("record_{}", i))).unwrap();
        }
        let lowest = log.lowest_offset();
        let highest = log.highest_offset();
        log.close().unwrap();

        let log = open_log(&dir, options);
        assert_eq!(log.lowest_offset(), lowest);
        assert_eq!(log.highest_offset(), highest);
        for i in 0..5u64 {
            assert_eq!(log.read(i).unwrap().value, format!("record_{}", i).into_bytes());
        }
    }
}
