//! Shared primitives for the key/value provider workspace: the error
//! taxonomy, operation mode flags, sentinel size encoding, buffer run views,
//! the bit-field result view, listing filters, and the key watcher.

pub mod bitfield;
pub mod buffer;
pub mod error;
pub mod filter;
pub mod mode;
pub mod sentinel;
pub mod watcher;

pub use bitfield::BitField;
pub use buffer::{ByteRun, ValueSink};
pub use error::{Error, Result};
pub use filter::{new_filter, register_filter, BytesFilter, KeyValueFilter};
pub use mode::Mode;
pub use watcher::{KeyWatcher, WaitOutcome};
