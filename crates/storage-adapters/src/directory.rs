//! `Directory` backed by the `users` collection of any `DataStore`.

use std::sync::Arc;

use async_trait::async_trait;

use domains::codec::decode_author;
use domains::{AuthorProfile, DataStore, Directory, StoreError, USERS};

pub struct DocumentDirectory {
    store: Arc<dyn DataStore>,
}

impl DocumentDirectory {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Directory for DocumentDirectory {
    async fn get_author_profile(&self, user_id: &str) -> Result<Option<AuthorProfile>, StoreError> {
        match self.store.get_record(USERS, user_id).await? {
            Some(doc) => Ok(Some(decode_author(&doc)?)),
            None => Ok(None),
        }
    }
}
