//! # storage-adapters
//!
//! Concrete implementations of the `domains` ports.
//!
//! | adapter | port | feature |
//! |---|---|---|
//! | [`memory::MemoryDataStore`] | `DataStore` | always |
//! | [`memory::MemoryBlobStore`] | `BlobStore` | always |
//! | [`directory::DocumentDirectory`] | `Directory` | always |
//! | `local::LocalBlobStore` | `BlobStore` | `media-local` |
//! | `postgres::PgDataStore` | `DataStore` | `db-postgres` |

pub mod directory;
pub mod memory;

#[cfg(feature = "media-local")]
pub mod local;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use directory::DocumentDirectory;
pub use memory::{MemoryBlobStore, MemoryDataStore};
