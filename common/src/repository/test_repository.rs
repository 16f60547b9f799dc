use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use mongodb::bson::{self, oid::ObjectId, Bson};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    entities::issue::Issue,
    error::{self, AddCode},
};

use super::{Entity, IssueFilter, IssueRepository, Repository, StatusCounts};

/// In-memory repository keeping documents in their BSON form, like the real collection.
pub struct TestRepository<T> {
    _t: std::marker::PhantomData<T>,
    pub db: Mutex<Vec<Bson>>,
    /// Inserts fail with a storage error.
    pub fail_insert: AtomicBool,
    /// Updates and deletes miss, as if another request removed the document first.
    pub lose_writes: AtomicBool,
}

impl<T> TestRepository<T> {
    pub fn new() -> Self {
        Self {
            _t: std::marker::PhantomData,
            db: Mutex::new(Vec::new()),
            fail_insert: AtomicBool::new(false),
            lose_writes: AtomicBool::new(false),
        }
    }
}

impl<T> Default for TestRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn field_equals(document: &Bson, field: &str, value: &Bson) -> bool {
    document
        .as_document()
        .and_then(|document| document.get(field))
        .map_or(false, |found| found == value)
}

impl<T: DeserializeOwned> TestRepository<T> {
    fn all(&self) -> error::Result<Vec<T>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .iter()
            .map(|document| bson::from_bson(document.clone()))
            .collect::<Result<_, _>>()?)
    }
}

#[async_trait]
impl<T> Repository<T> for TestRepository<T>
where
    T: Entity + Clone + Send + Sync + Serialize + DeserializeOwned,
{
    async fn insert(&self, item: &T) -> error::Result<bool> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Test repository insert failed").code(500));
        }

        let document = bson::to_bson(item)?;
        let id = Bson::ObjectId(item.id());
        let mut db = self.db.lock().unwrap();

        let contains = db.iter().any(|x| field_equals(x, "id", &id));
        if !contains {
            db.push(document);
        }
        Ok(!contains)
    }

    async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<T>> {
        let found = {
            let db = self.db.lock().unwrap();
            db.iter().find(|x| field_equals(x, field, value)).cloned()
        };
        Ok(found.map(bson::from_bson).transpose()?)
    }

    async fn update(&self, item: &T) -> error::Result<bool> {
        if self.lose_writes.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let document = bson::to_bson(item)?;
        let id = Bson::ObjectId(item.id());
        let mut db = self.db.lock().unwrap();

        match db.iter().position(|x| field_equals(x, "id", &id)) {
            Some(pos) => {
                db[pos] = document;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, field: &str, id: &ObjectId) -> error::Result<Option<T>> {
        if self.lose_writes.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let removed = {
            let mut db = self.db.lock().unwrap();
            let id = Bson::ObjectId(*id);
            db.iter()
                .position(|x| field_equals(x, field, &id))
                .map(|pos| db.remove(pos))
        };
        Ok(removed.map(bson::from_bson).transpose()?)
    }
}

#[async_trait]
impl IssueRepository for TestRepository<Issue<ObjectId>> {
    async fn find_filtered(&self, filter: &IssueFilter) -> error::Result<Vec<Issue<ObjectId>>> {
        let mut issues: Vec<Issue<ObjectId>> = self
            .all()?
            .into_iter()
            .filter(|issue| filter.matches(issue))
            .collect();

        issues.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        if let Some(limit) = filter.limit {
            issues.truncate(limit.max(0) as usize);
        }
        Ok(issues)
    }

    async fn count_by_status(&self) -> error::Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for issue in self.all()? {
            counts.add(issue.status, 1);
        }
        Ok(counts)
    }

    async fn count_by_category(&self) -> error::Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for issue in self.all()? {
            *counts.entry(issue.category.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
