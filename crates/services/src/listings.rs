//! # Listing write paths
//!
//! Posting, closing, replying to, reporting, rating and deleting listings.
//! These keep the invariants the read path relies on: `image_count` matches
//! the images actually stored and `comment_count` tracks the reply
//! sub-collection.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use domains::codec::{
    decode_listing, encode_new_listing, encode_new_reply, encode_rating, encode_report,
};
use domains::{
    fields, replies_collection, BlobStore, DataStore, Directory, FulfillmentRating,
    ListingDraft, ListingRecord, ListingReport, ListingStatus, RecordQuery, ReplyRecord,
    LISTINGS, RATINGS, REPORTS,
};

use crate::error::{AggregationError, Result};

pub struct ListingService {
    store: Arc<dyn DataStore>,
    blobs: Arc<dyn BlobStore>,
    directory: Arc<dyn Directory>,
}

impl ListingService {
    pub fn new(
        store: Arc<dyn DataStore>,
        blobs: Arc<dyn BlobStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            store,
            blobs,
            directory,
        }
    }

    /// Stores a new listing, then its images at indices `1..=n`.
    ///
    /// The record is written as `pending_review` and only flipped to `active`
    /// once every upload has succeeded, so feed readers never see a listing
    /// whose images are still missing. A failed upload removes the namespace
    /// and the record again.
    #[instrument(skip(self, draft, images), fields(images = images.len()))]
    pub async fn create_listing(
        &self,
        owner_id: &str,
        draft: ListingDraft,
        images: Vec<Bytes>,
    ) -> Result<ListingRecord> {
        validate_text("title", &draft.title)?;
        validate_text("body", &draft.body)?;
        self.require_user(owner_id).await?;

        let image_count = u32::try_from(images.len())
            .map_err(|_| AggregationError::Validation("too many images".into()))?;
        let doc = encode_new_listing(owner_id, &draft, image_count, Utc::now().timestamp());
        let id = self.store.insert_record(LISTINGS, doc).await?;

        let uploads = images.into_iter().enumerate().map(|(i, data)| {
            let id = id.as_str();
            async move { self.blobs.put_image(id, i as u32 + 1, data).await }
        });
        let failures: Vec<_> = join_all(uploads)
            .await
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .collect();
        if let Some(first) = failures.first() {
            warn!(
                listing_id = %id,
                failed = failures.len(),
                error = %first,
                "image upload failed, rolling back"
            );
            return Err(self.roll_back_listing(&id, first.to_string()).await);
        }

        let mut activate = Map::new();
        activate.insert(fields::STATUS.into(), Value::from(ListingStatus::Active.as_str()));
        if let Err(err) = self.store.update_fields(LISTINGS, &id, activate).await {
            warn!(listing_id = %id, error = %err, "activation failed, rolling back");
            return Err(self.roll_back_listing(&id, err.to_string()).await);
        }

        info!(listing_id = %id, "listing created");
        self.load_listing(&id).await
    }

    /// Undoes a half-created listing and returns the error to report.
    ///
    /// A record that cannot be deleted stays `pending_review`, which keeps it
    /// out of every feed; the failure is still logged and folded into the
    /// returned error.
    async fn roll_back_listing(&self, id: &str, cause: String) -> AggregationError {
        let mut problems = Vec::new();
        if let Err(err) = self.blobs.delete_namespace(id).await {
            error!(listing_id = %id, error = %err, "rollback: image cleanup failed");
            problems.push(format!("image cleanup: {err}"));
        }
        if let Err(err) = self.store.delete_record(LISTINGS, id).await {
            error!(listing_id = %id, error = %err, "rollback: listing left pending_review");
            problems.push(format!("record cleanup: {err}"));
        }
        if problems.is_empty() {
            AggregationError::StoreUnavailable(cause)
        } else {
            AggregationError::StoreUnavailable(format!(
                "{cause}; rollback incomplete ({})",
                problems.join(", ")
            ))
        }
    }

    /// Marks a listing closed, optionally recording who it went to.
    #[instrument(skip(self))]
    pub async fn close_listing(
        &self,
        listing_id: &str,
        fulfilled_by: Option<&str>,
    ) -> Result<ListingRecord> {
        self.load_listing(listing_id).await?;

        let mut update = Map::new();
        update.insert(fields::STATUS.into(), Value::from(ListingStatus::Closed.as_str()));
        if let Some(user_id) = fulfilled_by {
            update.insert(fields::FULFILLED_BY.into(), Value::from(user_id));
        }
        self.store.update_fields(LISTINGS, listing_id, update).await?;
        self.load_listing(listing_id).await
    }

    /// Adds a reply and bumps the listing's reply counter.
    ///
    /// If the counter cannot be bumped the reply is removed again, so a
    /// retried call does not leave a duplicate behind.
    #[instrument(skip(self, body))]
    pub async fn post_reply(
        &self,
        listing_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<ReplyRecord> {
        validate_text("body", body)?;
        self.load_listing(listing_id).await?;
        self.require_user(author_id).await?;

        let created = Utc::now().timestamp();
        let replies_path = replies_collection(listing_id);
        let id = self
            .store
            .insert_record(&replies_path, encode_new_reply(author_id, body, created))
            .await?;
        if let Err(err) = self
            .store
            .increment_field(LISTINGS, listing_id, fields::REPLY_COUNT, 1)
            .await
        {
            warn!(reply_id = %id, error = %err, "reply counter not bumped, removing reply");
            if let Err(cleanup) = self.store.delete_record(&replies_path, &id).await {
                error!(
                    reply_id = %id,
                    error = %cleanup,
                    "reply kept without counter update, comment_count has drifted"
                );
            }
            return Err(err.into());
        }

        Ok(ReplyRecord {
            id,
            listing_id: listing_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            created,
        })
    }

    /// Files a report against a listing. A user can report a listing once.
    #[instrument(skip(self, comment))]
    pub async fn report_listing(
        &self,
        listing_id: &str,
        reporter_id: &str,
        comment: &str,
    ) -> Result<ListingReport> {
        self.load_listing(listing_id).await?;
        self.require_user(reporter_id).await?;
        if self.user_reports_for(listing_id, reporter_id).await? > 0 {
            return Err(AggregationError::Validation(format!(
                "user {reporter_id} already reported listing {listing_id}"
            )));
        }

        let created = Utc::now().timestamp();
        let id = self
            .store
            .insert_record(REPORTS, encode_report(listing_id, reporter_id, comment, created))
            .await?;
        info!(report_id = %id, "listing reported");
        Ok(ListingReport {
            id,
            listing_id: listing_id.to_string(),
            reporter_id: reporter_id.to_string(),
            comment: comment.to_string(),
            created,
        })
    }

    /// How many reports a user has filed against a listing.
    pub async fn user_reports_for(&self, listing_id: &str, reporter_id: &str) -> Result<usize> {
        let query = RecordQuery::collection(REPORTS)
            .where_eq(fields::REPORTER, reporter_id)
            .where_eq(fields::REPORTED_LISTING, listing_id);
        Ok(self.store.query_records(&query).await?.len())
    }

    /// Records how a trade with the listing's owner went.
    #[instrument(skip(self))]
    pub async fn rate_fulfillment(
        &self,
        listing_id: &str,
        rated_by: &str,
        successful: bool,
    ) -> Result<FulfillmentRating> {
        let listing = self.load_listing(listing_id).await?;
        if listing.owner_id == rated_by {
            return Err(AggregationError::Validation(
                "owners cannot rate their own listing".into(),
            ));
        }
        self.require_user(rated_by).await?;

        let mut rating = FulfillmentRating {
            id: String::new(),
            listing_id: listing_id.to_string(),
            rated_by: rated_by.to_string(),
            user_id: listing.owner_id,
            successful,
            created: Utc::now().timestamp(),
        };
        rating.id = self.store.insert_record(RATINGS, encode_rating(&rating)).await?;
        info!(rating_id = %rating.id, user_id = %rating.user_id, "fulfillment rated");
        Ok(rating)
    }

    /// Removes a listing with its replies and images. Image cleanup is
    /// best-effort and only logged on failure.
    #[instrument(skip(self))]
    pub async fn delete_listing(&self, listing_id: &str) -> Result<()> {
        let record = self.load_listing(listing_id).await?;

        let replies_path = replies_collection(listing_id);
        let replies = self
            .store
            .query_records(&RecordQuery::collection(replies_path.as_str()))
            .await?;
        for reply in &replies {
            self.store.delete_record(&replies_path, &reply.id).await?;
        }
        self.store.delete_record(LISTINGS, listing_id).await?;

        match self.blobs.delete_namespace(record.image_namespace()).await {
            Ok(removed) if removed != record.image_count => {
                warn!(removed, declared = record.image_count, "image count mismatch on delete")
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "image cleanup failed"),
        }
        info!(replies = replies.len(), "listing deleted");
        Ok(())
    }

    async fn load_listing(&self, listing_id: &str) -> Result<ListingRecord> {
        let doc = self
            .store
            .get_record(LISTINGS, listing_id)
            .await?
            .ok_or_else(|| AggregationError::ListingNotFound(listing_id.to_string()))?;
        Ok(decode_listing(&doc)?)
    }

    async fn require_user(&self, user_id: &str) -> Result<()> {
        match self.directory.get_author_profile(user_id).await? {
            Some(profile) if profile.enabled => Ok(()),
            Some(_) => Err(AggregationError::Validation(format!("user {user_id} is disabled"))),
            None => Err(AggregationError::MissingAuthor {
                user_id: user_id.to_string(),
            }),
        }
    }
}

fn validate_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AggregationError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{
        AccountType, AuthorProfile, BlobError, Document, ListingType, MockBlobStore,
        MockDataStore, MockDirectory, Platform, ServerType, StoreError,
    };
    use mockall::Sequence;

    fn draft() -> ListingDraft {
        ListingDraft {
            title: "Giga egg".into(),
            body: "Fertilized, 2.5 hours left".into(),
            platform: Platform::PlayStation,
            server_type: ServerType::OfficialPve,
            listing_type: ListingType::ForSale,
            price: "offer".into(),
        }
    }

    fn alice() -> MockDirectory {
        let mut directory = MockDirectory::new();
        directory.expect_get_author_profile().returning(|user_id| {
            Ok(Some(AuthorProfile {
                user_id: user_id.to_string(),
                display_name: "Alice".into(),
                email: String::new(),
                enabled: true,
                platform: Platform::Unspecified,
                server_type: ServerType::Unspecified,
                account_type: AccountType::Regular,
            }))
        });
        directory
    }

    /// An active listing owned by `u1`.
    fn stored(id: &str, image_count: u32) -> Document {
        let mut fields = encode_new_listing("u1", &draft(), image_count, 1);
        fields.insert(
            fields::STATUS.into(),
            Value::from(ListingStatus::Active.as_str()),
        );
        Document::new(id, fields)
    }

    fn two_images() -> Vec<Bytes> {
        vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
    }

    fn failing_second_upload() -> MockBlobStore {
        let mut blobs = MockBlobStore::new();
        blobs.expect_put_image().returning(|_, index, _| {
            if index == 2 {
                Err(BlobError::Storage("disk full".into()))
            } else {
                Ok(())
            }
        });
        blobs
    }

    #[tokio::test]
    async fn create_listing_activates_only_after_uploads() {
        let mut seq = Sequence::new();
        let mut store = MockDataStore::new();
        store
            .expect_insert_record()
            .withf(|collection, fields| {
                collection == "posts"
                    && fields["image_count"] == 2
                    && fields["status"] == "pending_review"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("p1".into()));
        let mut blobs = MockBlobStore::new();
        blobs
            .expect_put_image()
            .withf(|ns, index, _| ns == "p1" && (*index == 1 || *index == 2))
            .times(2)
            .returning(|_, _, _| Ok(()));
        store
            .expect_update_fields()
            .withf(|collection, id, fields| {
                collection == "posts" && id == "p1" && fields["status"] == "active"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 2))));
        let service = ListingService::new(Arc::new(store), Arc::new(blobs), Arc::new(alice()));

        let record = service.create_listing("u1", draft(), two_images()).await.unwrap();

        assert_eq!(record.id, "p1");
        assert_eq!(record.image_count, 2);
        assert_eq!(record.status, ListingStatus::Active);
    }

    #[tokio::test]
    async fn failed_upload_rolls_the_listing_back() {
        let mut store = MockDataStore::new();
        store.expect_insert_record().returning(|_, _| Ok("p1".into()));
        store.expect_update_fields().times(0);
        store
            .expect_delete_record()
            .withf(|collection, id| collection == "posts" && id == "p1")
            .times(1)
            .returning(|_, _| Ok(true));
        let mut blobs = failing_second_upload();
        blobs
            .expect_delete_namespace()
            .times(1)
            .returning(|_| Ok(1));
        let service = ListingService::new(Arc::new(store), Arc::new(blobs), Arc::new(alice()));

        let err = service.create_listing("u1", draft(), two_images()).await.unwrap_err();

        assert_eq!(
            err,
            AggregationError::StoreUnavailable("blob storage error: disk full".into())
        );
    }

    #[tokio::test]
    async fn incomplete_rollback_is_reported_and_never_activates() {
        let mut store = MockDataStore::new();
        store.expect_insert_record().returning(|_, _| Ok("p1".into()));
        store.expect_update_fields().times(0);
        store
            .expect_delete_record()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("connection reset".into())));
        let mut blobs = failing_second_upload();
        blobs.expect_delete_namespace().returning(|_| Ok(1));
        let service = ListingService::new(Arc::new(store), Arc::new(blobs), Arc::new(alice()));

        let err = service.create_listing("u1", draft(), two_images()).await.unwrap_err();

        assert!(
            matches!(
                &err,
                AggregationError::StoreUnavailable(message)
                    if message.contains("rollback incomplete")
                        && message.contains("connection reset")
            ),
            "{err:?}"
        );
    }

    #[test]
    fn empty_title_is_rejected_before_any_write() {
        let service = ListingService::new(
            Arc::new(MockDataStore::new()),
            Arc::new(MockBlobStore::new()),
            Arc::new(MockDirectory::new()),
        );
        let mut bad = draft();
        bad.title = "   ".into();

        let err = tokio_test::assert_err!(tokio_test::block_on(
            service.create_listing("u1", bad, vec![])
        ));

        assert_eq!(err, AggregationError::Validation("title must not be empty".into()));
    }

    #[tokio::test]
    async fn post_reply_inserts_then_increments_counter() {
        let mut seq = Sequence::new();
        let mut store = MockDataStore::new();
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 0))));
        store
            .expect_insert_record()
            .withf(|collection, _| collection == "posts/p1/replies")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("r1".into()));
        store
            .expect_increment_field()
            .withf(|collection, id, field, delta| {
                collection == "posts" && id == "p1" && field == "comment_count" && *delta == 1
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(1));
        let service =
            ListingService::new(Arc::new(store), Arc::new(MockBlobStore::new()), Arc::new(alice()));

        let reply = service.post_reply("p1", "u2", "Is it still fertile?").await.unwrap();

        assert_eq!(reply.id, "r1");
        assert_eq!(reply.listing_id, "p1");
        assert_eq!(reply.author_id, "u2");
    }

    #[tokio::test]
    async fn reply_is_removed_when_the_counter_cannot_be_bumped() {
        let mut store = MockDataStore::new();
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 0))));
        store.expect_insert_record().returning(|_, _| Ok("r1".into()));
        store
            .expect_increment_field()
            .returning(|_, _, _, _| Err(StoreError::Unavailable("timeout".into())));
        store
            .expect_delete_record()
            .withf(|collection, id| collection == "posts/p1/replies" && id == "r1")
            .times(1)
            .returning(|_, _| Ok(true));
        let service =
            ListingService::new(Arc::new(store), Arc::new(MockBlobStore::new()), Arc::new(alice()));

        let err = service.post_reply("p1", "u2", "still there?").await.unwrap_err();

        assert!(matches!(err, AggregationError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn closing_an_unknown_listing_is_not_found() {
        let mut store = MockDataStore::new();
        store.expect_get_record().returning(|_, _| Ok(None));
        store.expect_update_fields().times(0);
        let service =
            ListingService::new(Arc::new(store), Arc::new(MockBlobStore::new()), Arc::new(alice()));

        let err = service.close_listing("gone", None).await.unwrap_err();

        assert_eq!(err, AggregationError::ListingNotFound("gone".into()));
    }

    #[tokio::test]
    async fn report_is_stored_with_reporter_and_listing() {
        let mut store = MockDataStore::new();
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 0))));
        store
            .expect_query_records()
            .withf(|query| query.collection == "reported_posts")
            .returning(|_| Ok(vec![]));
        store
            .expect_insert_record()
            .withf(|collection, fields| {
                collection == "reported_posts"
                    && fields["post"] == "p1"
                    && fields["user"] == "u2"
                    && fields["comments"] == "duplicate listing"
            })
            .times(1)
            .returning(|_, _| Ok("rep1".into()));
        let service =
            ListingService::new(Arc::new(store), Arc::new(MockBlobStore::new()), Arc::new(alice()));

        let report = service.report_listing("p1", "u2", "duplicate listing").await.unwrap();

        assert_eq!(report.id, "rep1");
        assert_eq!(report.reporter_id, "u2");
    }

    #[tokio::test]
    async fn second_report_by_the_same_user_is_rejected() {
        let mut store = MockDataStore::new();
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 0))));
        store
            .expect_query_records()
            .returning(|_| Ok(vec![Document::new("rep1", Map::new())]));
        store.expect_insert_record().times(0);
        let service =
            ListingService::new(Arc::new(store), Arc::new(MockBlobStore::new()), Arc::new(alice()));

        let err = service.report_listing("p1", "u2", "again").await.unwrap_err();

        assert!(matches!(err, AggregationError::Validation(_)));
    }

    #[tokio::test]
    async fn rating_targets_the_listing_owner() {
        let mut store = MockDataStore::new();
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 0))));
        store
            .expect_insert_record()
            .withf(|collection, fields| {
                collection == "ratings"
                    && fields["user_id"] == "u1"
                    && fields["rated_by"] == "u2"
                    && fields["successful"] == true
            })
            .times(1)
            .returning(|_, _| Ok("r9".into()));
        let service =
            ListingService::new(Arc::new(store), Arc::new(MockBlobStore::new()), Arc::new(alice()));

        let rating = service.rate_fulfillment("p1", "u2", true).await.unwrap();

        assert_eq!(rating.id, "r9");
        assert_eq!(rating.user_id, "u1");
    }

    #[tokio::test]
    async fn owners_cannot_rate_themselves() {
        let mut store = MockDataStore::new();
        store
            .expect_get_record()
            .returning(|_, id| Ok(Some(stored(id, 0))));
        store.expect_insert_record().times(0);
        let service = ListingService::new(
            Arc::new(store),
            Arc::new(MockBlobStore::new()),
            Arc::new(MockDirectory::new()),
        );

        let err = service.rate_fulfillment("p1", "u1", true).await.unwrap_err();

        assert!(matches!(err, AggregationError::Validation(_)));
    }
}
