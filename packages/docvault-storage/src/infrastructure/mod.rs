//! Infrastructure adapters for the revision store port

pub mod sqlite_store;

pub use sqlite_store::SqliteRevisionStore;
