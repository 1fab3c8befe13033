//! A segmented, append-only commit log.
//!
//! Clients append opaque byte payloads and receive a monotonically
//! increasing logical offset; later they read a record back by offset.
//! All in-memory state is reconstructed from on-disk segment files at
//! open, so the log survives process restarts.
//!
//! ```no_run
//! use commitlog::{Log, LogOptions, Record};
//!
//! let log = Log::open("./data/log", LogOptions::default())?;
//! let offset = log.append(Record::new("hello"))?;
//! let record = log.read(offset)?;
//! assert_eq!(record.value, b"hello");
//! # Ok::<(), commitlog::LogError>(())
//! ```

pub mod error;
pub mod log;

pub use error::{LogError, LogResult};
pub use log::{Log, LogOptions, LogReader, Record};
