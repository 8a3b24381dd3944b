//! # services
//!
//! Business logic of the trading post. Everything here talks to storage only
//! through the `domains` ports, so it runs unchanged over any adapter set.

pub mod aggregator;
pub mod error;
pub mod listings;
pub mod metrics;

pub use aggregator::{Aggregator, AggregatorSettings};
pub use error::{AggregationError, Result};
pub use listings::ListingService;
pub use metrics::AggregatorMetrics;
