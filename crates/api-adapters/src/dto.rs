//! Wire shapes for the JSON API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use domains::{
    AggregatedListing, AggregatedReply, ListingRecord, ListingStatus, ListingType, Platform,
    ReplyRecord, ServerType,
};

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub index: u32,
    /// Base64 (standard alphabet) PNG payload.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct ListingView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub platform: Platform,
    pub server_type: ServerType,
    pub listing_type: ListingType,
    pub price: String,
    pub created_at: Option<DateTime<Utc>>,
    pub owner_id: String,
    pub author_name: String,
    pub fulfilled_by: String,
    pub status: ListingStatus,
    pub reply_count: u32,
    pub image_count: u32,
    pub images: Vec<ImageView>,
    /// Declared images that could not be fetched for this response.
    pub missing_images: Vec<u32>,
    pub search_text: String,
}

impl From<AggregatedListing> for ListingView {
    fn from(agg: AggregatedListing) -> Self {
        let missing_images = agg.missing_image_indices();
        let AggregatedListing {
            listing,
            author_name,
            images,
            search_text,
        } = agg;
        Self {
            created_at: listing.created_at(),
            images: images
                .into_iter()
                .map(|img| ImageView {
                    index: img.index,
                    data: STANDARD.encode(&img.data),
                })
                .collect(),
            missing_images,
            author_name,
            search_text,
            id: listing.id,
            title: listing.title,
            body: listing.body,
            platform: listing.platform,
            server_type: listing.server_type,
            listing_type: listing.listing_type,
            price: listing.price,
            owner_id: listing.owner_id,
            fulfilled_by: listing.fulfilled_by,
            status: listing.status,
            reply_count: listing.reply_count,
            image_count: listing.image_count,
        }
    }
}

/// Listing summary returned by write endpoints, which never fetch images.
#[derive(Debug, Serialize)]
pub struct ListingSummary {
    pub id: String,
    pub status: ListingStatus,
    pub fulfilled_by: String,
    pub image_count: u32,
}

impl From<ListingRecord> for ListingSummary {
    fn from(record: ListingRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            fulfilled_by: record.fulfilled_by,
            image_count: record.image_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplyView {
    pub id: String,
    pub listing_id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<AggregatedReply> for ReplyView {
    fn from(agg: AggregatedReply) -> Self {
        let mut view = Self::from(agg.reply);
        view.author_name = Some(agg.author_name);
        view
    }
}

impl From<ReplyRecord> for ReplyView {
    fn from(reply: ReplyRecord) -> Self {
        Self {
            created_at: DateTime::from_timestamp(reply.created, 0),
            id: reply.id,
            listing_id: reply.listing_id,
            author_id: reply.author_id,
            author_name: None,
            body: reply.body,
        }
    }
}

/// Query string of the feed endpoint. Values use the stored spellings
/// (`PC`, `Official PvE`, `For Sale`) and match case-insensitively.
#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    pub platform: Option<String>,
    pub server_type: Option<String>,
    pub listing_type: Option<String>,
    /// `newest` for creation time descending; store order otherwise.
    pub order: Option<String>,
    /// Client-side text filter over the derived search string.
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub platform: Platform,
    pub server_type: ServerType,
    pub listing_type: ListingType,
    pub price: String,
    /// Base64-encoded images, uploaded at indices 1..=n in this order.
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseListingRequest {
    #[serde(default)]
    pub fulfilled_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostReplyRequest {
    pub author_id: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveCount {
    pub owner_id: String,
    pub active_listings: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReportListingRequest {
    pub reporter_id: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportCountParams {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReportCount {
    pub listing_id: String,
    pub user_id: String,
    pub reports: usize,
}

#[derive(Debug, Deserialize)]
pub struct RateFulfillmentRequest {
    pub rated_by: String,
    pub successful: bool,
}
