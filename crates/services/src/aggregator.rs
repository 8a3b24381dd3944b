//! # Aggregator
//!
//! Joins a listing record with its author and image set, and the feed
//! variants that do so for every record a query returns.
//!
//! Author lookups are mandatory: a listing without a resolvable author is an
//! error, never a listing with a blank name. Image fetches are best-effort:
//! each of the `image_count` slots is fetched concurrently, every fetch is
//! awaited to settlement, and failed slots are simply left out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};

use domains::codec::{decode_listing, decode_reply};
use domains::{
    fields, replies_collection, AggregatedListing, AggregatedReply, AuthorProfile, BlobError,
    BlobStore, DataStore, Directory, Document, ListingFilter, ListingImage, ListingOrder,
    ListingRecord, ListingStatus, RecordQuery, Replier, SortDirection, StoreError, LISTINGS,
};

use crate::error::{AggregationError, Result};
use crate::metrics::AggregatorMetrics;

/// Tuning knobs for the read path.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// Upper bound on a single image fetch. A timed-out slot is omitted.
    pub image_fetch_timeout: Duration,
    /// Upper bound on an author lookup. Expiry surfaces as `StoreUnavailable`.
    pub author_lookup_timeout: Duration,
    /// How many records of a batch are resolved at once.
    pub max_concurrent_resolutions: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            image_fetch_timeout: Duration::from_secs(10),
            author_lookup_timeout: Duration::from_secs(5),
            max_concurrent_resolutions: 16,
        }
    }
}

enum ImageFailure {
    Blob(BlobError),
    TimedOut,
}

impl ImageFailure {
    fn reason(&self) -> &'static str {
        match self {
            Self::Blob(err) => err.reason(),
            Self::TimedOut => "timeout",
        }
    }
}

impl std::fmt::Display for ImageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob(err) => err.fmt(f),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

pub struct Aggregator {
    store: Arc<dyn DataStore>,
    blobs: Arc<dyn BlobStore>,
    directory: Arc<dyn Directory>,
    settings: AggregatorSettings,
    metrics: AggregatorMetrics,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn DataStore>,
        blobs: Arc<dyn BlobStore>,
        directory: Arc<dyn Directory>,
        settings: AggregatorSettings,
        metrics: AggregatorMetrics,
    ) -> Self {
        Self {
            store,
            blobs,
            directory,
            settings,
            metrics,
        }
    }

    pub fn metrics(&self) -> &AggregatorMetrics {
        &self.metrics
    }

    /// Resolves the author and images of one listing.
    #[instrument(skip_all, fields(listing_id = %record.id, image_count = record.image_count))]
    pub async fn resolve_one(&self, record: ListingRecord) -> Result<AggregatedListing> {
        let author = self.lookup_author(&record.owner_id).await?;
        let images = self.fetch_images(&record).await;
        debug!(resolved = images.len(), "listing aggregated");
        self.metrics.resolved();
        Ok(AggregatedListing::new(record, author.display_name, images))
    }

    /// Active listings matching `filter`, each aggregated independently.
    ///
    /// Records that fail to decode or resolve are dropped from the result;
    /// only a failing query fails the call.
    #[instrument(skip(self))]
    pub async fn resolve_many(&self, filter: &ListingFilter) -> Result<Vec<AggregatedListing>> {
        let mut query = active_listings();
        if let Some(platform) = filter.platform {
            query = query.where_eq(fields::PLATFORM, platform.as_str());
        }
        if let Some(server_type) = filter.server_type {
            query = query.where_eq(fields::SERVER_TYPE, server_type.as_str());
        }
        if let Some(listing_type) = filter.listing_type {
            query = query.where_eq(fields::LISTING_TYPE, listing_type.as_str());
        }
        if filter.order == ListingOrder::NewestFirst {
            query = query.order_by(fields::CREATED, SortDirection::Descending);
        }
        self.resolve_query(&query).await
    }

    /// Fetches a listing by id and aggregates it.
    #[instrument(skip(self))]
    pub async fn resolve_by_id(&self, listing_id: &str) -> Result<AggregatedListing> {
        let record = self.load_listing(listing_id).await?;
        self.resolve_one(record).await
    }

    /// Active listings posted by one user, newest first.
    #[instrument(skip(self))]
    pub async fn resolve_owner_listings(&self, owner_id: &str) -> Result<Vec<AggregatedListing>> {
        let query = active_listings()
            .where_eq(fields::USER_ID, owner_id)
            .order_by(fields::CREATED, SortDirection::Descending);
        self.resolve_query(&query).await
    }

    /// Number of active listings a user currently has up.
    pub async fn count_active_listings(&self, owner_id: &str) -> Result<usize> {
        let query = active_listings().where_eq(fields::USER_ID, owner_id);
        Ok(self.store.query_records(&query).await?.len())
    }

    /// A listing's reply thread in posting order, each reply with its author's
    /// name. Replies whose author cannot be resolved are dropped.
    #[instrument(skip(self))]
    pub async fn resolve_replies(&self, listing_id: &str) -> Result<Vec<AggregatedReply>> {
        self.load_listing(listing_id).await?;

        let query = RecordQuery::collection(replies_collection(listing_id))
            .order_by(fields::CREATED, SortDirection::Ascending);
        let docs = self.store.query_records(&query).await?;

        let replies: Vec<_> = docs
            .iter()
            .filter_map(|doc| match decode_reply(listing_id, doc) {
                Ok(reply) => Some(reply),
                Err(err) => {
                    warn!(reply_id = %doc.id, error = %err, "skipping malformed reply");
                    self.metrics.excluded("decode");
                    None
                }
            })
            .collect();

        // Several replies usually share an author; look each one up once.
        let mut author_ids: Vec<String> = replies.iter().map(|r| r.author_id.clone()).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        let names: HashMap<String, Result<String>> = stream::iter(author_ids)
            .map(|user_id| async move {
                let outcome = self
                    .lookup_author(&user_id)
                    .await
                    .map(|profile| profile.display_name);
                if let Err(err) = &outcome {
                    warn!(user_id = %user_id, error = %err, "reply author unresolved");
                }
                (user_id, outcome)
            })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let mut resolved = Vec::with_capacity(replies.len());
        for reply in replies {
            match names.get(&reply.author_id) {
                Some(Ok(name)) => resolved.push(AggregatedReply {
                    author_name: name.clone(),
                    reply,
                }),
                Some(Err(err)) => self.metrics.excluded(err.code()),
                None => self.metrics.excluded("missing_author"),
            }
        }
        Ok(resolved)
    }

    /// Distinct users who replied to a listing, in order of their first reply.
    pub async fn repliers(&self, listing_id: &str) -> Result<Vec<Replier>> {
        let replies = self.resolve_replies(listing_id).await?;
        let mut repliers: Vec<Replier> = Vec::new();
        for AggregatedReply { reply, author_name } in replies {
            if !repliers.iter().any(|r| r.user_id == reply.author_id) {
                repliers.push(Replier {
                    user_id: reply.author_id,
                    display_name: author_name,
                });
            }
        }
        Ok(repliers)
    }

    async fn load_listing(&self, listing_id: &str) -> Result<ListingRecord> {
        let doc = self
            .store
            .get_record(LISTINGS, listing_id)
            .await?
            .ok_or_else(|| AggregationError::ListingNotFound(listing_id.to_string()))?;
        Ok(decode_listing(&doc)?)
    }

    async fn resolve_query(&self, query: &RecordQuery) -> Result<Vec<AggregatedListing>> {
        let docs = self.store.query_records(query).await?;
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let matched = docs.len();

        // `buffered` keeps the store's order while resolving concurrently.
        let resolved: Vec<AggregatedListing> = stream::iter(docs)
            .map(|doc| self.resolve_document(doc))
            .buffered(self.concurrency())
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;

        debug!(matched, resolved = resolved.len(), "feed aggregated");
        Ok(resolved)
    }

    async fn resolve_document(&self, doc: Document) -> Option<AggregatedListing> {
        let record = match decode_listing(&doc) {
            Ok(record) => record,
            Err(err) => {
                warn!(listing_id = %doc.id, error = %err, "excluding malformed listing");
                self.metrics.excluded("decode");
                return None;
            }
        };
        match self.resolve_one(record).await {
            Ok(listing) => Some(listing),
            Err(err) => {
                warn!(listing_id = %doc.id, error = %err, "excluding unresolvable listing");
                self.metrics.excluded(err.code());
                None
            }
        }
    }

    async fn lookup_author(&self, user_id: &str) -> Result<AuthorProfile> {
        let lookup = self.directory.get_author_profile(user_id);
        let outcome = match tokio::time::timeout(self.settings.author_lookup_timeout, lookup).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(AggregationError::StoreUnavailable(format!(
                    "author lookup for {user_id} timed out after {:?}",
                    self.settings.author_lookup_timeout
                )))
            }
        };
        let missing = || AggregationError::MissingAuthor {
            user_id: user_id.to_string(),
        };
        match outcome {
            Ok(Some(profile)) if !profile.display_name.is_empty() => Ok(profile),
            Ok(_) => Err(missing()),
            Err(StoreError::Decode(err)) => {
                warn!(user_id, error = %err, "author profile is malformed");
                Err(missing())
            }
            Err(err) => Err(AggregationError::StoreUnavailable(err.to_string())),
        }
    }

    /// Issues exactly `image_count` fetches and waits for all of them.
    async fn fetch_images(&self, record: &ListingRecord) -> Vec<ListingImage> {
        if record.image_count == 0 {
            return Vec::new();
        }
        let namespace = record.image_namespace();
        let timeout = self.settings.image_fetch_timeout;

        let fetches = (1..=record.image_count).map(|index| async move {
            let outcome =
                match tokio::time::timeout(timeout, self.blobs.get_image(namespace, index)).await {
                    Ok(Ok(data)) => Ok(data),
                    Ok(Err(err)) => Err(ImageFailure::Blob(err)),
                    Err(_) => Err(ImageFailure::TimedOut),
                };
            (index, outcome)
        });

        // join_all yields in input order, i.e. ascending index.
        let settled = join_all(fetches).await;

        let mut images = Vec::with_capacity(settled.len());
        for (index, outcome) in settled {
            match outcome {
                Ok(data) => images.push(ListingImage { index, data }),
                Err(failure) => {
                    warn!(index, error = %failure, "omitting image");
                    self.metrics.image_fetch_failed(failure.reason());
                }
            }
        }
        images
    }

    fn concurrency(&self) -> usize {
        self.settings.max_concurrent_resolutions.max(1)
    }
}

fn active_listings() -> RecordQuery {
    RecordQuery::collection(LISTINGS).where_eq(fields::STATUS, ListingStatus::Active.as_str())
}
