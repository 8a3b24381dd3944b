//! # Document codec
//!
//! Schema-validated conversion between stored documents and typed models.
//! Every required field is checked once here, so callers get either a fully
//! populated model or a `DecodeError` naming the offending field.

use serde_json::{json, Map, Value};

use crate::documents::{fields, Document};
use crate::errors::DecodeError;
use crate::models::{
    AccountType, AuthorProfile, FulfillmentRating, ListingDraft, ListingRecord, ListingStatus,
    ListingType, Platform, ReplyRecord, ServerType,
};

fn required<'a>(doc: &'a Document, field: &'static str) -> Result<&'a Value, DecodeError> {
    doc.get(field).ok_or_else(|| DecodeError::MissingField {
        id: doc.id.clone(),
        field,
    })
}

fn wrong_type(doc: &Document, field: &'static str, expected: &'static str) -> DecodeError {
    DecodeError::WrongType {
        id: doc.id.clone(),
        field,
        expected,
    }
}

fn required_str(doc: &Document, field: &'static str) -> Result<String, DecodeError> {
    required(doc, field)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(doc, field, "string"))
}

fn required_i64(doc: &Document, field: &'static str) -> Result<i64, DecodeError> {
    required(doc, field)?
        .as_i64()
        .ok_or_else(|| wrong_type(doc, field, "integer"))
}

fn required_count(doc: &Document, field: &'static str) -> Result<u32, DecodeError> {
    required(doc, field)?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| wrong_type(doc, field, "non-negative integer"))
}

fn optional_str(doc: &Document, field: &'static str) -> Result<Option<String>, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(doc, field, "string")),
    }
}

pub fn decode_listing(doc: &Document) -> Result<ListingRecord, DecodeError> {
    Ok(ListingRecord {
        id: doc.id.clone(),
        title: required_str(doc, fields::TITLE)?,
        body: required_str(doc, fields::BODY)?,
        platform: Platform::parse(&required_str(doc, fields::PLATFORM)?)?,
        server_type: ServerType::parse(&required_str(doc, fields::SERVER_TYPE)?)?,
        listing_type: ListingType::parse(&required_str(doc, fields::LISTING_TYPE)?)?,
        price: required_str(doc, fields::PRICE)?,
        created: required_i64(doc, fields::CREATED)?,
        owner_id: required_str(doc, fields::USER_ID)?,
        fulfilled_by: required_str(doc, fields::FULFILLED_BY)?,
        status: ListingStatus::parse(&required_str(doc, fields::STATUS)?)?,
        reply_count: required_count(doc, fields::REPLY_COUNT)?,
        image_count: required_count(doc, fields::IMAGE_COUNT)?,
    })
}

/// Field map for a freshly posted listing. It starts out `pending_review` and
/// is only activated once all of its images are stored.
pub fn encode_new_listing(
    owner_id: &str,
    draft: &ListingDraft,
    image_count: u32,
    created: i64,
) -> Map<String, Value> {
    let value = json!({
        fields::TITLE: draft.title,
        fields::BODY: draft.body,
        fields::PLATFORM: draft.platform.as_str(),
        fields::SERVER_TYPE: draft.server_type.as_str(),
        fields::LISTING_TYPE: draft.listing_type.as_str(),
        fields::PRICE: draft.price,
        fields::CREATED: created,
        fields::USER_ID: owner_id,
        fields::FULFILLED_BY: "",
        fields::STATUS: ListingStatus::PendingReview.as_str(),
        fields::REPLY_COUNT: 0,
        fields::IMAGE_COUNT: image_count,
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Users only need a display name; the remaining profile fields default.
pub fn decode_author(doc: &Document) -> Result<AuthorProfile, DecodeError> {
    let enabled = match doc.get(fields::ENABLED) {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(wrong_type(doc, fields::ENABLED, "boolean")),
    };
    Ok(AuthorProfile {
        user_id: doc.id.clone(),
        display_name: required_str(doc, fields::DISPLAY_NAME)?,
        email: optional_str(doc, fields::EMAIL)?.unwrap_or_default(),
        enabled,
        platform: optional_str(doc, fields::PLATFORM)?
            .map(|raw| Platform::parse(&raw))
            .transpose()?
            .unwrap_or(Platform::Unspecified),
        server_type: optional_str(doc, fields::SERVER_TYPE)?
            .map(|raw| ServerType::parse(&raw))
            .transpose()?
            .unwrap_or(ServerType::Unspecified),
        account_type: optional_str(doc, fields::ACCOUNT_TYPE)?
            .map(|raw| AccountType::parse(&raw))
            .transpose()?
            .unwrap_or(AccountType::Regular),
    })
}

pub fn decode_reply(listing_id: &str, doc: &Document) -> Result<ReplyRecord, DecodeError> {
    Ok(ReplyRecord {
        id: doc.id.clone(),
        listing_id: listing_id.to_string(),
        author_id: required_str(doc, fields::USER_ID)?,
        body: required_str(doc, fields::BODY)?,
        created: required_i64(doc, fields::CREATED)?,
    })
}

pub fn encode_new_reply(author_id: &str, body: &str, created: i64) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(fields::USER_ID.into(), Value::from(author_id));
    map.insert(fields::BODY.into(), Value::from(body));
    map.insert(fields::CREATED.into(), Value::from(created));
    map
}

pub fn encode_report(
    listing_id: &str,
    reporter_id: &str,
    comment: &str,
    created: i64,
) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(fields::REPORT_COMMENT.into(), Value::from(comment));
    map.insert(fields::CREATED.into(), Value::from(created));
    map.insert(fields::REPORTED_LISTING.into(), Value::from(listing_id));
    map.insert(fields::REPORTER.into(), Value::from(reporter_id));
    map
}

pub fn encode_rating(rating: &FulfillmentRating) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(fields::CREATED.into(), Value::from(rating.created));
    map.insert(fields::RATED_LISTING.into(), Value::from(rating.listing_id.as_str()));
    map.insert(fields::RATED_BY.into(), Value::from(rating.rated_by.as_str()));
    map.insert(fields::SUCCESSFUL.into(), Value::from(rating.successful));
    map.insert(fields::USER_ID.into(), Value::from(rating.user_id.as_str()));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_doc() -> Document {
        let Value::Object(fields) = json!({
            "title": "Wyvern eggs",
            "body": "Fresh lightning eggs",
            "post_type": "For Sale",
            "server_type": "official pvp",
            "platform": "PC",
            "price": "2000 poly",
            "created": 1_552_000_000,
            "user_id": "u1",
            "fulfilled_by": "",
            "status": "active",
            "comment_count": 2,
            "image_count": 3,
        }) else {
            unreachable!()
        };
        Document::new("p1", fields)
    }

    #[test]
    fn decodes_a_complete_listing() {
        let record = decode_listing(&listing_doc()).unwrap();
        assert_eq!(record.id, "p1");
        assert_eq!(record.server_type, ServerType::OfficialPvp);
        assert_eq!(record.listing_type, ListingType::ForSale);
        assert_eq!(record.image_count, 3);
        assert_eq!(record.reply_count, 2);
        assert!(!record.is_fulfilled());
    }

    #[test]
    fn missing_field_is_named() {
        let mut doc = listing_doc();
        doc.fields.remove("image_count");
        assert_eq!(
            decode_listing(&doc).unwrap_err(),
            DecodeError::MissingField {
                id: "p1".into(),
                field: "image_count"
            }
        );
    }

    #[test]
    fn mistyped_field_is_rejected() {
        let mut doc = listing_doc();
        doc.fields.insert("created".into(), json!("yesterday"));
        assert!(matches!(
            decode_listing(&doc).unwrap_err(),
            DecodeError::WrongType { field: "created", .. }
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut doc = listing_doc();
        doc.fields.insert("comment_count".into(), json!(-1));
        assert!(matches!(
            decode_listing(&doc).unwrap_err(),
            DecodeError::WrongType { field: "comment_count", .. }
        ));
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let mut doc = listing_doc();
        doc.fields.insert("status".into(), json!("archived"));
        assert!(matches!(
            decode_listing(&doc).unwrap_err(),
            DecodeError::UnknownVariant { kind: "listing status", .. }
        ));
    }

    #[test]
    fn new_listing_encodes_back_to_the_same_record() {
        let draft = ListingDraft {
            title: "Rex".into(),
            body: "Level 150".into(),
            platform: Platform::Xbox,
            server_type: ServerType::OfficialPve,
            listing_type: ListingType::WantToBuy,
            price: "offer".into(),
        };
        let doc = Document::new("p9", encode_new_listing("u7", &draft, 2, 42));
        let record = decode_listing(&doc).unwrap();
        assert_eq!(record.owner_id, "u7");
        assert_eq!(record.status, ListingStatus::PendingReview);
        assert_eq!(record.image_count, 2);
        assert_eq!(record.created, 42);
    }

    #[test]
    fn reports_and_ratings_use_the_stored_field_names() {
        let report = encode_report("p1", "u2", "scam", 7);
        assert_eq!(report["post"], json!("p1"));
        assert_eq!(report["user"], json!("u2"));
        assert_eq!(report["comments"], json!("scam"));

        let rating = encode_rating(&FulfillmentRating {
            id: String::new(),
            listing_id: "p1".into(),
            rated_by: "u2".into(),
            user_id: "u1".into(),
            successful: true,
            created: 9,
        });
        assert_eq!(rating["post_id"], json!("p1"));
        assert_eq!(rating["rated_by"], json!("u2"));
        assert_eq!(rating["user_id"], json!("u1"));
        assert_eq!(rating["successful"], json!(true));
        assert_eq!(rating["created"], json!(9));
    }

    #[test]
    fn author_defaults_optional_fields() {
        let Value::Object(fields) = json!({ "display_name": "Alice" }) else {
            unreachable!()
        };
        let author = decode_author(&Document::new("u1", fields)).unwrap();
        assert_eq!(author.display_name, "Alice");
        assert!(author.enabled);
        assert_eq!(author.account_type, AccountType::Regular);
    }

    #[test]
    fn reply_requires_author() {
        let Value::Object(fields) = json!({ "body": "still available?", "created": 5 }) else {
            unreachable!()
        };
        assert!(matches!(
            decode_reply("p1", &Document::new("r1", fields)).unwrap_err(),
            DecodeError::MissingField { field: "user_id", .. }
        ));
    }
}
