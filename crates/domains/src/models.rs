//! # Domain Models
//!
//! These structs represent the core entities of the trading post: listings,
//! the authors behind them, and the replies they collect. The `Aggregated*`
//! types are read-time projections built by the services layer and never
//! persisted.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// Declares a closed enumeration with an explicit stored-string table.
///
/// Parsing is case-insensitive against the table; anything else is an
/// `UnknownVariant` decode error rather than a silent "unknown".
macro_rules! stored_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $stored:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const TABLE: &'static [(&'static str, $name)] = &[
                $( ($stored, $name::$variant) ),+
            ];

            /// The exact string persisted in the document store.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $stored ),+
                }
            }

            pub fn parse(raw: &str) -> Result<Self, DecodeError> {
                Self::TABLE
                    .iter()
                    .find(|(stored, _)| stored.eq_ignore_ascii_case(raw))
                    .map(|(_, value)| *value)
                    .ok_or_else(|| DecodeError::UnknownVariant {
                        kind: $kind,
                        value: raw.to_string(),
                    })
            }
        }

        impl std::str::FromStr for $name {
            type Err = DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DecodeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

stored_enum! {
    /// Game platform a listing is posted for.
    Platform, "platform" {
        Unspecified => "",
        Pc => "PC",
        PlayStation => "PS4",
        NintendoSwitch => "Switch",
        Xbox => "Xbox",
    }
}

stored_enum! {
    ServerType, "server type" {
        Unspecified => "",
        OfficialPve => "Official PvE",
        OfficialPvp => "Official PvP",
    }
}

stored_enum! {
    /// Whether the poster is selling or looking to buy.
    ListingType, "listing type" {
        Unspecified => "",
        ForSale => "For Sale",
        WantToBuy => "Want to Buy",
    }
}

stored_enum! {
    /// Lifecycle status. Only `Active` listings appear in feeds.
    ListingStatus, "listing status" {
        Closed => "closed",
        Active => "active",
        PendingReview => "pending_review",
        Approved => "approved",
        Suspended => "suspended",
    }
}

stored_enum! {
    AccountType, "account type" {
        Regular => "regular",
        Admin => "admin",
    }
}

/// Canonical listing data as stored in the `posts` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Assigned by the DataStore on creation.
    pub id: String,
    pub title: String,
    pub body: String,
    pub platform: Platform,
    pub server_type: ServerType,
    pub listing_type: ListingType,
    /// Free-form; sellers write things like "500 metal" or "offer".
    pub price: String,
    /// Seconds since the Unix epoch.
    pub created: i64,
    pub owner_id: String,
    /// Empty while the listing is unfulfilled.
    pub fulfilled_by: String,
    pub status: ListingStatus,
    /// Denormalized counter maintained by the reply path.
    pub reply_count: u32,
    /// Fixed at creation. Images live at indices `1..=image_count`.
    pub image_count: u32,
}

impl ListingRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.created, 0).single()
    }

    pub fn is_fulfilled(&self) -> bool {
        !self.fulfilled_by.is_empty()
    }

    /// Blob namespace holding this listing's images.
    pub fn image_namespace(&self) -> &str {
        &self.id
    }
}

/// Display view of a user, owned by the Directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub enabled: bool,
    pub platform: Platform,
    pub server_type: ServerType,
    pub account_type: AccountType,
}

/// A reply in a listing's `replies` sub-collection. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRecord {
    pub id: String,
    pub listing_id: String,
    pub author_id: String,
    pub body: String,
    pub created: i64,
}

/// A user's complaint about a listing, queued for moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingReport {
    pub id: String,
    pub listing_id: String,
    pub reporter_id: String,
    pub comment: String,
    pub created: i64,
}

/// Feedback left on a listing's owner once a trade went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRating {
    pub id: String,
    pub listing_id: String,
    pub rated_by: String,
    /// The listing owner being rated.
    pub user_id: String,
    pub successful: bool,
    pub created: i64,
}

/// One resolved image slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingImage {
    /// 1-based upload sequence index.
    pub index: u32,
    pub data: Bytes,
}

/// A listing joined with its author and images. Rebuilt on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedListing {
    pub listing: ListingRecord,
    pub author_name: String,
    /// Successfully fetched images, ascending by index. Failed slots are absent.
    pub images: Vec<ListingImage>,
    pub search_text: String,
}

impl AggregatedListing {
    pub fn new(listing: ListingRecord, author_name: String, images: Vec<ListingImage>) -> Self {
        let search_text = format!(
            "{} {} {} {}",
            listing.title, listing.body, listing.price, author_name
        );
        Self {
            listing,
            author_name,
            images,
            search_text,
        }
    }

    /// Case-insensitive substring match over the derived search string.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self
                .search_text
                .to_lowercase()
                .contains(&needle.to_lowercase())
    }

    /// Indices that were declared but could not be fetched.
    pub fn missing_image_indices(&self) -> Vec<u32> {
        (1..=self.listing.image_count)
            .filter(|idx| !self.images.iter().any(|img| img.index == *idx))
            .collect()
    }
}

/// A reply joined with its author's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedReply {
    pub reply: ReplyRecord,
    pub author_name: String,
}

/// Someone who replied to a listing; candidates for `fulfilled_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replier {
    pub user_id: String,
    pub display_name: String,
}

/// Requested ordering for feed queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrder {
    /// Whatever stable order the store returns.
    #[default]
    Store,
    NewestFirst,
}

/// Feed filter. `status == active` is always applied on top of these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFilter {
    pub platform: Option<Platform>,
    pub server_type: Option<ServerType>,
    pub listing_type: Option<ListingType>,
    #[serde(default)]
    pub order: ListingOrder,
}

/// Caller-supplied fields for a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub body: String,
    pub platform: Platform,
    pub server_type: ServerType,
    pub listing_type: ListingType,
    pub price: String,
}
