//! Hosting layer for the key/value service: the [`Provider`] registry maps
//! database UUIDs to backend instances and dispatches decoded batch
//! requests to them. The transport hands this crate a verb, a mode, and a
//! contiguous byte region; everything after that point is specified here.

mod provider;
mod request;

pub use provider::{DatabaseEntry, Provider};
