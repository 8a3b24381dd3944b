//! # Local filesystem `BlobStore`
//!
//! Images are laid out the way the hosted bucket stored them: one directory
//! per listing, one `{index}.png` file per image.
//!
//! ```text
//! <root>/<listing id>/1.png
//! <root>/<listing id>/2.png
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use domains::{BlobError, BlobStore};

pub struct LocalBlobStore {
    /// Root directory for all listing images (e.g. "./data/media")
    root_path: PathBuf,
    max_bytes: u64,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        Self {
            root_path: root,
            max_bytes,
        }
    }

    /// Listing ids are store-assigned, but they still end up in a path.
    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, BlobError> {
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BlobError::Storage(format!("invalid namespace {namespace:?}")));
        }
        Ok(self.root_path.join(namespace))
    }

    fn image_path(&self, namespace: &str, index: u32) -> Result<PathBuf, BlobError> {
        Ok(self.namespace_dir(namespace)?.join(format!("{index}.png")))
    }
}

fn io_error(err: std::io::Error) -> BlobError {
    BlobError::Storage(err.to_string())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get_image(&self, namespace: &str, index: u32) -> Result<Bytes, BlobError> {
        let path = self.image_path(namespace, index)?;

        // Check the size before reading so an oversized file is never buffered.
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BlobError::NotFound {
                    namespace: namespace.to_string(),
                    index,
                })
            }
            Err(err) => return Err(io_error(err)),
        };
        if meta.len() > self.max_bytes {
            return Err(BlobError::SizeExceeded {
                size: meta.len(),
                limit: self.max_bytes,
            });
        }

        let data = fs::read(&path).await.map_err(io_error)?;
        Ok(Bytes::from(data))
    }

    async fn put_image(&self, namespace: &str, index: u32, data: Bytes) -> Result<(), BlobError> {
        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir).await.map_err(io_error)?;
        let path = dir.join(format!("{index}.png"));
        fs::write(&path, &data).await.map_err(io_error)?;
        debug!(path = %path.display(), bytes = data.len(), "image stored");
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<u32, BlobError> {
        let dir = self.namespace_dir(namespace)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(io_error(err)),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            fs::remove_file(entry.path()).await.map_err(io_error)?;
            removed += 1;
        }
        fs::remove_dir(&dir).await.map_err(io_error)?;
        Ok(removed)
    }
}
