pub mod cloudinary;
pub mod test_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{entities::issue::IssueImage, error};

/// Image bytes received from a client, not yet stored anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub storage_id: String,
}

impl From<StoredImage> for IssueImage {
    fn from(image: StoredImage) -> Self {
        IssueImage {
            url: Some(image.url),
            storage_id: Some(image.storage_id),
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, upload: &ImageUpload) -> error::Result<StoredImage>;
    /// Deleting an id that is already gone succeeds.
    async fn delete(&self, storage_id: &str) -> error::Result<()>;
}

pub type MediaStoreObject = Arc<dyn MediaStore>;
