//! Diagnostic side channel for failures the read path absorbs.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReasonLabels {
    pub reason: String,
}

/// Counters shared by every aggregation call. Cloning shares the series.
#[derive(Clone, Debug, Default)]
pub struct AggregatorMetrics {
    image_fetch_failures: Family<ReasonLabels, Counter>,
    listings_excluded: Family<ReasonLabels, Counter>,
    listings_resolved: Counter,
}

impl AggregatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "image_fetch_failures",
            "Image fetches that failed and were omitted from a listing",
            self.image_fetch_failures.clone(),
        );
        registry.register(
            "listings_excluded",
            "Listings or replies dropped from a batch result",
            self.listings_excluded.clone(),
        );
        registry.register(
            "listings_resolved",
            "Listings successfully aggregated",
            self.listings_resolved.clone(),
        );
    }

    pub fn image_fetch_failed(&self, reason: &str) {
        self.image_fetch_failures
            .get_or_create(&labels(reason))
            .inc();
    }

    pub fn excluded(&self, reason: &str) {
        self.listings_excluded.get_or_create(&labels(reason)).inc();
    }

    pub fn resolved(&self) {
        self.listings_resolved.inc();
    }

    pub fn image_fetch_failures(&self, reason: &str) -> u64 {
        self.image_fetch_failures.get_or_create(&labels(reason)).get()
    }

    pub fn excluded_count(&self, reason: &str) -> u64 {
        self.listings_excluded.get_or_create(&labels(reason)).get()
    }

    pub fn resolved_count(&self) -> u64 {
        self.listings_resolved.get()
    }
}

fn labels(reason: &str) -> ReasonLabels {
    ReasonLabels {
        reason: reason.to_string(),
    }
}
