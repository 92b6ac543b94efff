//! Storage engines behind the common database surface.
//!
//! A [`Database`] is selected by a type tag in JSON configuration and built
//! through the [backend registry](registry). Two reference engines ship
//! here: an ordered key set with range listing and an unordered key set.
//! Both constrain values to be empty; engines storing real values implement
//! the same trait.

pub mod comparator;
pub mod config;
pub mod database;
pub mod ordered;
pub mod registry;
pub mod unordered;

pub use comparator::{register_comparator, Comparator, LexShorterFirst};
pub use config::register_allocator;
pub use database::Database;
pub use ordered::OrderedSetDatabase;
pub use registry::{create_database, register_backend, BackendConstructor};
pub use unordered::UnorderedSetDatabase;
