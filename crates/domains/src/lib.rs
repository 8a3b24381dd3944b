//! trading-post/crates/domains/src/lib.rs
//!
//! Domain models, document schema and port definitions for the trading post.
//! This crate performs no I/O.

pub mod codec;
pub mod documents;
pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use documents::*;
pub use errors::*;
pub use models::*;
pub use ports::*;
