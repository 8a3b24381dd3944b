//! In-memory `DataStore`, used by the default binary profile and the tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use domains::{DataStore, Document, RecordQuery, StoreError};

/// Collections keyed by path; documents keyed by id inside each collection.
#[derive(Default)]
pub struct MemoryDataStore {
    collections: DashMap<String, BTreeMap<String, Map<String, Value>>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document under a caller-chosen id, replacing any previous one.
    pub fn put(&self, collection: &str, doc: Document) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id, doc.fields);
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
            .map(|fields| Document::new(id, fields)))
    }

    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<Document>, StoreError> {
        if query.equals.iter().any(|(field, _)| field.is_empty()) {
            return Err(StoreError::Rejected("empty field name in predicate".into()));
        }
        let mut docs: Vec<Document> = match self.collections.get(&query.collection) {
            Some(collection) => collection
                .iter()
                .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                .filter(|doc| query.matches(doc))
                .collect(),
            None => Vec::new(),
        };
        query.sort(&mut docs);
        Ok(docs)
    }

    async fn insert_record(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.put(collection, Document::new(id.clone(), fields));
        Ok(id)
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut docs = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection, id))?;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| Self::not_found(collection, id))?;
        doc.extend(fields);
        Ok(())
    }

    async fn increment_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        // The shard write lock held by `get_mut` makes read-modify-write atomic.
        let mut docs = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection, id))?;
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| Self::not_found(collection, id))?;
        let current = match doc.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StoreError::Rejected(format!("field `{field}` is not an integer")))?,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            StoreError::Rejected(format!("field `{field}` would overflow"))
        })?;
        doc.insert(field.to_string(), Value::from(next));
        Ok(next)
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .get_mut(collection)
            .map(|mut docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::SortDirection;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = MemoryDataStore::new();
        let id = store
            .insert_record("posts", fields(json!({ "title": "Rex" })))
            .await
            .unwrap();

        let doc = store.get_record("posts", &id).await.unwrap().unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.get("title"), Some(&json!("Rex")));
        assert!(store.get_record("posts", "nope").await.unwrap().is_none());
        assert!(store.get_record("users", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_and_orders_with_stable_ties() {
        let store = MemoryDataStore::new();
        for (id, created, status) in [
            ("c", 5, "active"),
            ("a", 5, "active"),
            ("b", 9, "closed"),
            ("d", 7, "active"),
        ] {
            store.put(
                "posts",
                Document::new(id, fields(json!({ "created": created, "status": status }))),
            );
        }
        let query = RecordQuery::collection("posts")
            .where_eq("status", "active")
            .order_by("created", SortDirection::Descending);

        let ids = |docs: Vec<Document>| docs.into_iter().map(|d| d.id).collect::<Vec<_>>();
        let first = ids(store.query_records(&query).await.unwrap());
        let second = ids(store.query_records(&query).await.unwrap());

        assert_eq!(first, ["d", "a", "c"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn query_on_unknown_collection_is_empty() {
        let store = MemoryDataStore::new();
        let docs = store.query_records(&RecordQuery::collection("posts/x/replies")).await.unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn empty_predicate_field_is_rejected() {
        let store = MemoryDataStore::new();
        let query = RecordQuery::collection("posts").where_eq("", "active");
        let err = tokio_test::assert_err!(tokio_test::block_on(store.query_records(&query)));
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn increment_starts_from_zero_and_accumulates() {
        let store = MemoryDataStore::new();
        store.put("posts", Document::new("p1", Map::new()));

        assert_eq!(store.increment_field("posts", "p1", "comment_count", 1).await.unwrap(), 1);
        assert_eq!(store.increment_field("posts", "p1", "comment_count", 2).await.unwrap(), 3);
        assert!(matches!(
            store.increment_field("posts", "p2", "comment_count", 1).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn increment_past_i64_max_is_rejected_and_leaves_the_value() {
        let store = MemoryDataStore::new();
        store.put("posts", Document::new("p1", fields(json!({ "comment_count": i64::MAX }))));

        assert!(matches!(
            store.increment_field("posts", "p1", "comment_count", 1).await,
            Err(StoreError::Rejected(_))
        ));
        let doc = store.get_record("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get("comment_count"), Some(&json!(i64::MAX)));
    }

    #[tokio::test]
    async fn update_merges_and_delete_reports_existence() {
        let store = MemoryDataStore::new();
        store.put(
            "posts",
            Document::new("p1", fields(json!({ "status": "active", "title": "Rex" }))),
        );

        store
            .update_fields("posts", "p1", fields(json!({ "status": "closed" })))
            .await
            .unwrap();
        let doc = store.get_record("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get("status"), Some(&json!("closed")));
        assert_eq!(doc.get("title"), Some(&json!("Rex")));

        assert!(store.delete_record("posts", "p1").await.unwrap());
        assert!(!store.delete_record("posts", "p1").await.unwrap());
    }
}
