pub mod mongo_repository;
pub mod test_repository;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};

use crate::{
    entities::issue::{Category, Issue, Status},
    error,
};

pub trait Entity {
    fn id(&self) -> ObjectId;
}

#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn insert(&self, item: &T) -> error::Result<bool>;
    async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<T>>;
    /// Replaces the stored document with the same id. Last write wins.
    async fn update(&self, item: &T) -> error::Result<bool>;
    async fn delete(&self, field: &str, item: &ObjectId) -> error::Result<Option<T>>;
}

pub type RepositoryObject<T> = Arc<dyn Repository<T>>;

/// Conjunction of optional predicates over issues. `search` is itself a disjunction over
/// title and description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub reporter: Option<ObjectId>,
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub search: Option<String>,
    pub created_from: Option<i64>,
    pub created_to: Option<i64>,
    pub limit: Option<i64>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue<ObjectId>) -> bool {
        if let Some(reporter) = &self.reporter {
            if !issue.is_reported_by(reporter) {
                return false;
            }
        }

        if let Some(status) = self.status {
            if issue.status != status {
                return false;
            }
        }

        if let Some(category) = self.category {
            if issue.category != category {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let search = search.to_lowercase();
            if !issue.title.to_lowercase().contains(&search)
                && !issue.description.to_lowercase().contains(&search)
            {
                return false;
            }
        }

        if let Some(from) = self.created_from {
            if issue.created_at < from {
                return false;
            }
        }

        if let Some(to) = self.created_to {
            if issue.created_at > to {
                return false;
            }
        }

        true
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();

        if let Some(reporter) = self.reporter {
            filter.insert("reportedBy.userId", reporter);
        }

        if let Some(status) = self.status {
            filter.insert("status", status.to_string());
        }

        if let Some(category) = self.category {
            filter.insert("category", category.to_string());
        }

        if let Some(search) = &self.search {
            let pattern = regex::escape(search);
            filter.insert(
                "$or",
                vec![
                    doc! {"title": {"$regex": pattern.clone(), "$options": "i"}},
                    doc! {"description": {"$regex": pattern, "$options": "i"}},
                ],
            );
        }

        if self.created_from.is_some() || self.created_to.is_some() {
            let mut range = Document::new();
            if let Some(from) = self.created_from {
                range.insert("$gte", from);
            }
            if let Some(to) = self.created_to {
                range.insert("$lte", to);
            }
            filter.insert("createdAt", range);
        }

        filter
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub resolved: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status, count: u64) {
        match status {
            Status::Pending => self.pending += count,
            Status::InProgress => self.in_progress += count,
            Status::Resolved => self.resolved += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.resolved
    }
}

/// Issue-specific queries on top of the generic repository.
#[async_trait]
pub trait IssueRepository: Repository<Issue<ObjectId>> {
    /// Matching issues, newest first.
    async fn find_filtered(&self, filter: &IssueFilter) -> error::Result<Vec<Issue<ObjectId>>>;
    async fn count_by_status(&self) -> error::Result<StatusCounts>;
    /// Only categories present in at least one issue appear.
    async fn count_by_category(&self) -> error::Result<BTreeMap<String, u64>>;
}

pub type IssueRepositoryObject = Arc<dyn IssueRepository>;
