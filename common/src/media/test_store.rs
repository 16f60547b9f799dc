use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::error::{self, AddCode};

use super::{ImageUpload, MediaStore, StoredImage};

/// In-memory media store. Failures can be switched on to exercise compensation paths.
#[derive(Default)]
pub struct TestMediaStore {
    pub images: Mutex<BTreeMap<String, ImageUpload>>,
    pub fail_store: AtomicBool,
    pub fail_delete: AtomicBool,
    pub delete_attempts: AtomicUsize,
    counter: AtomicUsize,
}

impl TestMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, storage_id: &str) -> bool {
        self.images.lock().unwrap().contains_key(storage_id)
    }
}

#[async_trait]
impl MediaStore for TestMediaStore {
    async fn store(&self, upload: &ImageUpload) -> error::Result<StoredImage> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Media store upload failed").code(500));
        }

        let number = self.counter.fetch_add(1, Ordering::SeqCst);
        let storage_id = format!("civic-issues/test-{}", number);
        self.images
            .lock()
            .unwrap()
            .insert(storage_id.clone(), upload.clone());

        Ok(StoredImage {
            url: format!("https://media.test/{}", storage_id),
            storage_id,
        })
    }

    async fn delete(&self, storage_id: &str) -> error::Result<()> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Media store delete failed").code(500));
        }

        self.images.lock().unwrap().remove(storage_id);
        Ok(())
    }
}
