//! Segmented log storage.
//!
//! The log is an ordered collection of segments presenting a single logical
//! offset space. Each segment pairs a store file (length-prefixed record
//! payloads) with an index file (fixed-width offset-to-position mapping).
//!
//! # Module Structure
//!
//! - `record`: the stored record type and its codec
//! - `store`: append-only byte file with positional reads
//! - `index`: mmap-backed offset-to-position mapping
//! - `segment`: store/index pairing with offset bookkeeping
//! - `manager`: the log itself - recovery, rotation, truncation, reads

mod index;
mod manager;
mod record;
mod segment;
mod store;


pub use index::{ENT_WIDTH, Index, OFF_WIDTH, POS_WIDTH};
pub use manager::{
    DEFAULT_MAX_INDEX_BYTES, DEFAULT_MAX_STORE_BYTES, Log, LogOptions, LogReader,
};
pub use record::Record;
pub use store::{LEN_WIDTH, Store};
