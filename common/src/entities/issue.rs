use std::{collections::BTreeMap, str::FromStr};

use derive_more::Display;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{
    error::{self, AddCode},
    repository::Entity,
};

pub const TITLE_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
pub const DEFAULT_ADDRESS: &str = "Unknown Location";

#[derive(Debug, Display, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[display(fmt = "Pending")]
    Pending,
    #[serde(rename = "In-Progress")]
    #[display(fmt = "In-Progress")]
    InProgress,
    #[display(fmt = "Resolved")]
    Resolved,
}

impl FromStr for Status {
    type Err = error::ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Status::Pending),
            "In-Progress" => Ok(Status::InProgress),
            "Resolved" => Ok(Status::Resolved),
            _ => Err(anyhow::anyhow!("Invalid status value").code(400)),
        }
    }
}

#[derive(Debug, Display, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    #[display(fmt = "Roads")]
    Roads,
    #[serde(rename = "Water Supply")]
    #[display(fmt = "Water Supply")]
    WaterSupply,
    #[display(fmt = "Electricity")]
    Electricity,
    #[display(fmt = "Sanitation")]
    Sanitation,
    #[serde(rename = "Street Lights")]
    #[display(fmt = "Street Lights")]
    StreetLights,
    #[display(fmt = "Drainage")]
    Drainage,
    #[display(fmt = "Parks")]
    Parks,
    #[display(fmt = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Roads,
        Category::WaterSupply,
        Category::Electricity,
        Category::Sanitation,
        Category::StreetLights,
        Category::Drainage,
        Category::Parks,
        Category::Other,
    ];
}

impl FromStr for Category {
    type Err = error::ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.to_string() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid category: {}", s).code(400))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_address")]
    pub address: String,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

/// Media Store reference; both fields are null when no photo was attached.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssueImage {
    pub url: Option<String>,
    pub storage_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reporter<Id> {
    pub user_id: Id,
    pub name: String,
    pub email: String,
}

impl Reporter<ObjectId> {
    pub fn stringify(self) -> Reporter<String> {
        Reporter {
            user_id: self.user_id.to_hex(),
            name: self.name,
            email: self.email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange<Id> {
    pub status: Status,
    pub updated_at: i64,
    pub updated_by: Option<Id>,
}

impl StatusChange<ObjectId> {
    pub fn stringify(self) -> StatusChange<String> {
        StatusChange {
            status: self.status,
            updated_at: self.updated_at,
            updated_by: self.updated_by.map(|id| id.to_hex()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Issue<Id> {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: Location,
    #[serde(default)]
    pub image: IssueImage,
    pub status: Status,
    pub reported_by: Reporter<Id>,
    #[serde(default)]
    pub admin_notes: String,
    pub status_history: Vec<StatusChange<Id>>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Validated fields of a new report.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: Location,
}

impl Issue<ObjectId> {
    /// A fresh `Pending` issue whose history holds the single system entry.
    pub fn new(
        draft: IssueDraft,
        reporter: Reporter<ObjectId>,
        image: IssueImage,
        now: i64,
    ) -> Self {
        Issue {
            id: ObjectId::new(),
            title: draft.title,
            description: draft.description,
            category: draft.category,
            location: draft.location,
            image,
            status: Status::Pending,
            reported_by: reporter,
            admin_notes: String::new(),
            status_history: vec![StatusChange {
                status: Status::Pending,
                updated_at: now,
                updated_by: None,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Any status may follow any other, including itself.
    pub fn transition(&mut self, status: Status, updated_by: ObjectId, now: i64) {
        self.status = status;
        self.status_history.push(StatusChange {
            status,
            updated_at: now,
            updated_by: Some(updated_by),
        });
        self.updated_at = now;
    }

    pub fn set_admin_notes(&mut self, notes: String, now: i64) {
        self.admin_notes = notes;
        self.updated_at = now;
    }

    pub fn is_reported_by(&self, user_id: &ObjectId) -> bool {
        &self.reported_by.user_id == user_id
    }

    pub fn stringify(self) -> Issue<String> {
        Issue {
            id: self.id.to_hex(),
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
            image: self.image,
            status: self.status,
            reported_by: self.reported_by.stringify(),
            admin_notes: self.admin_notes,
            status_history: self
                .status_history
                .into_iter()
                .map(StatusChange::stringify)
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn track(self) -> TrackedIssue {
        TrackedIssue {
            id: self.id.to_hex(),
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
            image: self.image,
            status: self.status,
            reported_by: self.reported_by.stringify(),
            status_history: self
                .status_history
                .into_iter()
                .map(StatusChange::stringify)
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Distinct admins that appear in the status history, in first-seen order.
    pub fn updater_ids(&self) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        for id in self.status_history.iter().filter_map(|change| change.updated_by) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Full view with each history entry's updater resolved from `updaters`. Unknown
    /// updaters keep only their id. The reporter stays the snapshot taken at creation.
    pub fn admin_view(self, updaters: &BTreeMap<ObjectId, Updater>) -> AdminIssue {
        AdminIssue {
            id: self.id.to_hex(),
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
            image: self.image,
            status: self.status,
            reported_by: self.reported_by.stringify(),
            admin_notes: self.admin_notes,
            status_history: self
                .status_history
                .into_iter()
                .map(|change| StatusChange {
                    status: change.status,
                    updated_at: change.updated_at,
                    updated_by: change.updated_by.map(|id| {
                        updaters.get(&id).cloned().unwrap_or(Updater {
                            id: id.to_hex(),
                            name: None,
                            email: None,
                        })
                    }),
                })
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(self) -> IssueSummary {
        IssueSummary {
            id: self.id.to_hex(),
            title: self.title,
            category: self.category,
            status: self.status,
            created_at: self.created_at,
            reported_by: self.reported_by.stringify(),
        }
    }
}

impl Entity for Issue<ObjectId> {
    fn id(&self) -> ObjectId {
        self.id
    }
}

/// Public tracking view. Has no admin notes field at all.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: Location,
    pub image: IssueImage,
    pub status: Status,
    pub reported_by: Reporter<String>,
    pub status_history: Vec<StatusChange<String>>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Updater {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Admin detail view: history entries name the admin who made each change.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: Location,
    pub image: IssueImage,
    pub status: Status,
    pub reported_by: Reporter<String>,
    pub admin_notes: String,
    pub status_history: Vec<StatusChange<Updater>>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub status: Status,
    pub created_at: i64,
    pub reported_by: Reporter<String>,
}
