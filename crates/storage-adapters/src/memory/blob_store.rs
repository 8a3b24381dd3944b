//! In-memory `BlobStore` with the same read ceiling as the real backends.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use domains::{BlobError, BlobStore};

pub struct MemoryBlobStore {
    images: DashMap<(String, u32), Bytes>,
    max_bytes: u64,
}

impl MemoryBlobStore {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            images: DashMap::new(),
            max_bytes,
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_image(&self, namespace: &str, index: u32) -> Result<Bytes, BlobError> {
        let data = self
            .images
            .get(&(namespace.to_string(), index))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlobError::NotFound {
                namespace: namespace.to_string(),
                index,
            })?;
        let size = data.len() as u64;
        if size > self.max_bytes {
            return Err(BlobError::SizeExceeded {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(data)
    }

    async fn put_image(&self, namespace: &str, index: u32, data: Bytes) -> Result<(), BlobError> {
        self.images.insert((namespace.to_string(), index), data);
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<u32, BlobError> {
        // Counted inside `retain` so concurrent writers to other namespaces
        // cannot skew the result.
        let mut removed = 0u32;
        self.images.retain(|(ns, _), _| {
            let keep = ns != namespace;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_images_are_refused_on_read() {
        let store = MemoryBlobStore::new(4);
        store.put_image("p1", 1, Bytes::from_static(b"tiny")).await.unwrap();
        store.put_image("p1", 2, Bytes::from_static(b"too big")).await.unwrap();

        assert_eq!(store.get_image("p1", 1).await.unwrap(), Bytes::from_static(b"tiny"));
        assert_eq!(
            store.get_image("p1", 2).await.unwrap_err(),
            BlobError::SizeExceeded { size: 7, limit: 4 }
        );
        assert!(matches!(
            store.get_image("p1", 3).await.unwrap_err(),
            BlobError::NotFound { index: 3, .. }
        ));
    }

    #[tokio::test]
    async fn delete_namespace_leaves_other_listings_alone() {
        let store = MemoryBlobStore::new(1024);
        store.put_image("p1", 1, Bytes::from_static(b"a")).await.unwrap();
        store.put_image("p1", 2, Bytes::from_static(b"b")).await.unwrap();
        store.put_image("p2", 1, Bytes::from_static(b"c")).await.unwrap();

        assert_eq!(store.delete_namespace("p1").await.unwrap(), 2);
        assert!(store.get_image("p2", 1).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delete_namespace_counts_only_its_own_images_under_concurrent_writes() {
        let store = std::sync::Arc::new(MemoryBlobStore::new(1024));
        for round in 0..50u32 {
            store.put_image("victim", 1, Bytes::from_static(b"v")).await.unwrap();
            let writers: Vec<_> = (0..64u32)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store
                            .put_image(&format!("other{round}"), i, Bytes::from_static(b"o"))
                            .await
                    })
                })
                .collect();

            assert_eq!(store.delete_namespace("victim").await.unwrap(), 1);

            for writer in writers {
                writer.await.unwrap().unwrap();
            }
        }
        assert!(store.get_image("victim", 1).await.is_err());
        assert!(store.get_image("other49", 63).await.is_ok());
    }
}
