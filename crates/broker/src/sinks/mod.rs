//! Sink implementations
//!
//! Contains LogSink, FileSink and the store-backed StoreSink with its
//! MemoryStore and SegmentStore backends.

mod file;
mod log;
mod store;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::store::{MemoryStore, SegmentStore, StoreSink};
