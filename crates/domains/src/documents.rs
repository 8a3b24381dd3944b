//! # Documents and queries
//!
//! The storage ports speak in schemaless documents, the shape of the hosted
//! document database the marketplace was built on. Typed models are produced
//! from them by [`crate::codec`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LISTINGS: &str = "posts";
pub const USERS: &str = "users";
pub const REPORTS: &str = "reported_posts";
pub const RATINGS: &str = "ratings";

/// Path of a listing's reply sub-collection.
pub fn replies_collection(listing_id: &str) -> String {
    format!("{LISTINGS}/{listing_id}/replies")
}

/// Stored field names.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const BODY: &str = "body";
    pub const LISTING_TYPE: &str = "post_type";
    pub const SERVER_TYPE: &str = "server_type";
    pub const PLATFORM: &str = "platform";
    pub const PRICE: &str = "price";
    pub const CREATED: &str = "created";
    pub const USER_ID: &str = "user_id";
    pub const FULFILLED_BY: &str = "fulfilled_by";
    pub const STATUS: &str = "status";
    pub const REPLY_COUNT: &str = "comment_count";
    pub const IMAGE_COUNT: &str = "image_count";

    pub const DISPLAY_NAME: &str = "display_name";
    pub const EMAIL: &str = "email";
    pub const ENABLED: &str = "enabled";
    pub const ACCOUNT_TYPE: &str = "account_type";

    // reported_posts
    pub const REPORT_COMMENT: &str = "comments";
    pub const REPORTED_LISTING: &str = "post";
    pub const REPORTER: &str = "user";

    // ratings (the rated user is stored under `user_id`)
    pub const RATED_LISTING: &str = "post_id";
    pub const RATED_BY: &str = "rated_by";
    pub const SUCCESSFUL: &str = "successful";
}

/// A stored record: its store-assigned id plus its field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Equality-filtered scan of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub collection: String,
    pub equals: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
}

impl RecordQuery {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            equals: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    /// Orders documents the way every adapter must: by the requested field,
    /// then by id ascending so equal keys never reshuffle between calls.
    pub fn sort(&self, docs: &mut [Document]) {
        match &self.order_by {
            Some(order) => docs.sort_by(|a, b| {
                let primary = compare_values(a.get(&order.field), b.get(&order.field));
                let primary = match order.direction {
                    SortDirection::Ascending => primary,
                    SortDirection::Descending => primary.reverse(),
                };
                primary.then_with(|| a.id.cmp(&b.id))
            }),
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }
    }
}

/// Total order over the JSON scalars we store. Missing sorts first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
