use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    options::{FindOptions, IndexOptions},
    IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    entities::issue::{Issue, Status},
    error::{self, AddCode},
};

use super::{Entity, IssueFilter, IssueRepository, Repository, StatusCounts};

pub struct MongoRepository<T> {
    pub collection: mongodb::Collection<T>,
}

impl<T> MongoRepository<T> {
    pub async fn new(mongo_uri: &str, database: &str, collection: &str) -> error::Result<Self> {
        let collection = mongodb::Client::with_uri_str(mongo_uri)
            .await?
            .database(database)
            .collection(collection);
        Ok(Self { collection })
    }
}

impl<T: Send + Sync> MongoRepository<T> {
    pub async fn unique_index(&self, field: &str) -> error::Result<()> {
        let index = IndexModel::builder()
            .keys(doc! {field: 1})
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index, None).await?;
        Ok(())
    }
}

#[async_trait]
impl<T> Repository<T> for MongoRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin + Clone + Send + Sync,
{
    async fn insert(&self, item: &T) -> error::Result<bool> {
        let result = self
            .collection
            .find_one(doc! {"id": item.id()}, None)
            .await?
            .is_none();

        if result {
            self.collection.insert_one(item, None).await?;
        }
        Ok(result)
    }

    async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<T>> {
        let result = self.collection.find_one(doc! {field: value}, None).await?;
        Ok(result)
    }

    async fn update(&self, item: &T) -> error::Result<bool> {
        let result = self
            .collection
            .replace_one(doc! {"id": item.id()}, item, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, field: &str, item: &ObjectId) -> error::Result<Option<T>> {
        let result = self
            .collection
            .find_one_and_delete(doc! {field: item}, None)
            .await?;
        Ok(result)
    }
}

fn count_of(document: &Document) -> u64 {
    match document.get("count") {
        Some(Bson::Int32(count)) => *count as u64,
        Some(Bson::Int64(count)) => *count as u64,
        _ => 0,
    }
}

impl MongoRepository<Issue<ObjectId>> {
    async fn group_by(&self, field: &str) -> error::Result<Vec<(String, u64)>> {
        let pipeline = vec![doc! {
            "$group": {
                "_id": format!("${}", field),
                "count": {"$sum": 1},
            }
        }];

        let groups: Vec<mongodb::error::Result<Document>> = self
            .collection
            .aggregate(pipeline, None)
            .await?
            .collect()
            .await;

        groups
            .into_iter()
            .map(|group| {
                let group = group?;
                let key = group
                    .get_str("_id")
                    .map_err(|_| anyhow::anyhow!("Malformed {} group", field).code(500))?
                    .to_string();
                Ok((key, count_of(&group)))
            })
            .collect()
    }
}

#[async_trait]
impl IssueRepository for MongoRepository<Issue<ObjectId>> {
    async fn find_filtered(&self, filter: &IssueFilter) -> error::Result<Vec<Issue<ObjectId>>> {
        let find_options = FindOptions::builder()
            .sort(doc! {"createdAt": -1, "id": -1})
            .limit(filter.limit)
            .build();

        let results: Vec<mongodb::error::Result<Issue<ObjectId>>> = self
            .collection
            .find(filter.to_document(), find_options)
            .await?
            .collect()
            .await;

        Ok(results.into_iter().collect::<mongodb::error::Result<_>>()?)
    }

    async fn count_by_status(&self) -> error::Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for (status, count) in self.group_by("status").await? {
            counts.add(status.parse::<Status>()?, count);
        }
        Ok(counts)
    }

    async fn count_by_category(&self) -> error::Result<BTreeMap<String, u64>> {
        Ok(self.group_by("category").await?.into_iter().collect())
    }
}
