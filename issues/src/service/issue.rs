use std::collections::BTreeMap;

use actix_web::{web, HttpRequest};
use chrono::Utc;
use mongodb::bson::{oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::{
    access_rules::{authorize, ChangeStatus, Create, Delete, EditNotes, Read, ReadAny},
    context::Context,
    entities::{
        issue::{
            AdminIssue, Category, Issue, IssueDraft, IssueImage, Location, Reporter, Status,
            TrackedIssue, Updater, DEFAULT_ADDRESS, DESCRIPTION_MAX_LEN, TITLE_MAX_LEN,
        },
        user::User,
    },
    error::{self, AddCode},
    media::{MediaStoreObject, StoredImage},
    repository::{IssueFilter, IssueRepositoryObject, Repository},
};

use super::form::read_issue_form;

/// Report fields as submitted. `location` is either an object or its JSON text, and the
/// coordinates may be numbers or numeric strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIssue {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<Value>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|value| value.is_finite())
}

fn parse_location(value: Value) -> error::Result<Location> {
    let value = match value {
        Value::String(text) => serde_json::from_str::<Value>(&text)
            .map_err(|_| anyhow::anyhow!("Location must be valid JSON").code(400))?,
        other => other,
    };

    let Value::Object(fields) = value else {
        return Err(anyhow::anyhow!("Location coordinates are required").code(400));
    };

    let (Some(latitude), Some(longitude)) = (
        coordinate(fields.get("latitude")),
        coordinate(fields.get("longitude")),
    ) else {
        return Err(anyhow::anyhow!("Location coordinates are required").code(400));
    };

    let address = fields
        .get("address")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .unwrap_or(DEFAULT_ADDRESS)
        .to_string();

    Ok(Location {
        latitude,
        longitude,
        address,
    })
}

impl CreateIssue {
    pub fn validate(self) -> error::Result<IssueDraft> {
        let (Some(title), Some(description), Some(category), Some(location)) = (
            present(self.title),
            present(self.description),
            present(self.category),
            self.location,
        ) else {
            return Err(anyhow::anyhow!("Please provide all required fields").code(400));
        };

        if title.chars().count() > TITLE_MAX_LEN {
            return Err(anyhow::anyhow!(
                "Title cannot exceed {} characters",
                TITLE_MAX_LEN
            )
            .code(400));
        }

        if description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(anyhow::anyhow!(
                "Description cannot exceed {} characters",
                DESCRIPTION_MAX_LEN
            )
            .code(400));
        }

        Ok(IssueDraft {
            title,
            description,
            category: category.parse::<Category>()?,
            location: parse_location(location)?,
        })
    }
}

/// Which view of a single issue the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reporter (or admin) reading the full record.
    Owner,
    /// Admin console; full record for any issue with status updaters resolved.
    Admin,
    /// Public tracking by id; admin notes are withheld.
    Public,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IssueView {
    Full(Issue<String>),
    Admin(AdminIssue),
    Tracked(TrackedIssue),
}

pub struct IssueService {
    context: Context,
}

impl IssueService {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    fn issues(&self) -> error::Result<IssueRepositoryObject> {
        self.context.try_get_manual::<IssueRepositoryObject>()
    }

    async fn find_issue(
        issues: &IssueRepositoryObject,
        id: ObjectId,
    ) -> error::Result<Issue<ObjectId>> {
        issues
            .find("id", &Bson::ObjectId(id))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Issue not found").code(404))
    }

    /// Looks up the name and email of every admin in the issue's status history.
    async fn resolve_updaters(
        &self,
        issue: &Issue<ObjectId>,
    ) -> error::Result<BTreeMap<ObjectId, Updater>> {
        let users = self.context.try_get_repository::<User<ObjectId>>()?;
        let mut updaters = BTreeMap::new();

        for id in issue.updater_ids() {
            if let Some(user) = users.find("id", &Bson::ObjectId(id)).await? {
                updaters.insert(
                    id,
                    Updater {
                        id: id.to_hex(),
                        name: Some(user.name),
                        email: Some(user.email),
                    },
                );
            }
        }

        Ok(updaters)
    }

    /// Best effort: a failed removal leaves an orphaned image behind and is only logged.
    async fn discard_image(&self, storage_id: &str) {
        let media = match self.context.try_get_manual::<MediaStoreObject>() {
            Ok(media) => media,
            Err(err) => {
                log::error!("Cannot remove image {}: {}", storage_id, err);
                return;
            }
        };

        if let Err(err) = media.delete(storage_id).await {
            log::warn!("Failed to remove image {}: {}", storage_id, err);
        }
    }

    /// Reads the submitted form, stores the photo if there is one, then creates the issue.
    pub async fn report(
        &self,
        req: &HttpRequest,
        payload: web::Payload,
    ) -> error::Result<Issue<String>> {
        self.context.auth().require_id()?;

        let (request, upload) = read_issue_form(req, payload).await?;
        let image = match upload {
            Some(upload) => {
                let media = self.context.try_get_manual::<MediaStoreObject>()?;
                Some(media.store(&upload).await?)
            }
            None => None,
        };

        self.create(request, image).await
    }

    /// Persists a new `Pending` issue. When anything fails after the photo was stored,
    /// the photo is removed again.
    pub async fn create(
        &self,
        request: CreateIssue,
        image: Option<StoredImage>,
    ) -> error::Result<Issue<String>> {
        let result = self.create_issue(request, image.clone()).await;

        if let (Err(err), Some(image)) = (&result, image) {
            log::warn!(
                "Issue was not created ({}), removing image {}",
                err,
                image.storage_id
            );
            self.discard_image(&image.storage_id).await;
        }

        result
    }

    async fn create_issue(
        &self,
        request: CreateIssue,
        image: Option<StoredImage>,
    ) -> error::Result<Issue<String>> {
        let auth = self.context.auth();
        authorize(Create, auth, (), "Not authorized to report issues")?;
        let user_id = auth.require_id()?;

        let draft = request.validate()?;

        let users = self.context.try_get_repository::<User<ObjectId>>()?;
        let Some(user) = users.find("id", &Bson::ObjectId(user_id)).await? else {
            return Err(anyhow::anyhow!("User not found").code(401));
        };

        let issues = self.issues()?;
        let issue = Issue::new(
            draft,
            Reporter {
                user_id: user.id,
                name: user.name,
                email: user.email,
            },
            image.map(IssueImage::from).unwrap_or_default(),
            Utc::now().timestamp_micros(),
        );

        if !issues.insert(&issue).await? {
            return Err(anyhow::anyhow!("Issue {} already exists", issue.id).code(500));
        }

        log::info!("Issue {} reported by {}", issue.id, user_id);
        Ok(issue.stringify())
    }

    pub async fn my_issues(&self) -> error::Result<Vec<Issue<String>>> {
        let user_id = self.context.auth().require_id()?;

        let issues = self
            .issues()?
            .find_filtered(&IssueFilter {
                reporter: Some(user_id),
                ..Default::default()
            })
            .await?;

        Ok(issues.into_iter().map(Issue::stringify).collect())
    }

    pub async fn get_by_id(&self, id: ObjectId, mode: AccessMode) -> error::Result<IssueView> {
        let auth = self.context.auth();
        let issues = self.issues()?;

        match mode {
            AccessMode::Public => Ok(IssueView::Tracked(
                Self::find_issue(&issues, id).await?.track(),
            )),
            AccessMode::Admin => {
                authorize(ReadAny, auth, (), "Admin access required")?;
                let issue = Self::find_issue(&issues, id).await?;
                let updaters = self.resolve_updaters(&issue).await?;
                Ok(IssueView::Admin(issue.admin_view(&updaters)))
            }
            AccessMode::Owner => {
                auth.require_id()?;
                let issue = Self::find_issue(&issues, id).await?;
                authorize(Read, auth, &issue, "Not authorized to access this issue")?;
                Ok(IssueView::Full(issue.stringify()))
            }
        }
    }

    pub async fn transition_status(
        &self,
        id: ObjectId,
        status: Option<String>,
    ) -> error::Result<Issue<String>> {
        let auth = self.context.auth();
        authorize(ChangeStatus, auth, (), "Admin access required")?;
        let admin_id = auth.require_id()?;

        let status = status.as_deref().unwrap_or_default().parse::<Status>()?;

        let issues = self.issues()?;
        let mut issue = Self::find_issue(&issues, id).await?;
        issue.transition(status, admin_id, Utc::now().timestamp_micros());

        if !issues.update(&issue).await? {
            return Err(anyhow::anyhow!("Issue not found").code(404));
        }

        log::info!("Issue {} moved to {} by {}", issue.id, status, admin_id);
        Ok(issue.stringify())
    }

    pub async fn set_admin_notes(
        &self,
        id: ObjectId,
        notes: Option<String>,
    ) -> error::Result<Issue<String>> {
        authorize(EditNotes, self.context.auth(), (), "Admin access required")?;

        let Some(notes) = notes.filter(|notes| !notes.trim().is_empty()) else {
            return Err(anyhow::anyhow!("Notes are required").code(400));
        };

        let issues = self.issues()?;
        let mut issue = Self::find_issue(&issues, id).await?;
        issue.set_admin_notes(notes, Utc::now().timestamp_micros());

        if !issues.update(&issue).await? {
            return Err(anyhow::anyhow!("Issue not found").code(404));
        }

        Ok(issue.stringify())
    }

    pub async fn delete(&self, id: ObjectId) -> error::Result<()> {
        let auth = self.context.auth();
        auth.require_id()?;

        let issues = self.issues()?;
        let issue = Self::find_issue(&issues, id).await?;
        authorize(Delete, auth, &issue, "Not authorized to delete this issue")?;

        if let Some(storage_id) = &issue.image.storage_id {
            self.discard_image(storage_id).await;
        }

        if issues.delete("id", &issue.id).await?.is_none() {
            return Err(anyhow::anyhow!("Issue not found").code(404));
        }

        log::info!("Issue {} deleted", issue.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use mongodb::bson::{oid::ObjectId, Bson};
    use serde_json::json;

    use super::{AccessMode, CreateIssue, IssueService, IssueView};
    use crate::test_utils::TestEnv;
    use common::{
        auth::Auth,
        entities::{
            issue::{Category, Status, DEFAULT_ADDRESS},
            role::Role,
        },
        media::{ImageUpload, MediaStore},
        repository::Repository,
    };

    fn request() -> CreateIssue {
        CreateIssue {
            title: Some("Pothole on Main St".to_string()),
            description: Some("Large pothole near the bus stop".to_string()),
            category: Some("Roads".to_string()),
            location: Some(json!({"latitude": 12.97, "longitude": 77.59})),
        }
    }

    fn upload() -> ImageUpload {
        ImageUpload {
            file_name: "pothole.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff],
        }
    }

    #[test]
    fn validation_accepts_string_locations_and_defaults_address() {
        let draft = CreateIssue {
            location: Some(json!(r#"{"latitude": "1.5", "longitude": 2}"#)),
            ..request()
        }
        .validate()
        .unwrap();

        assert_eq!(draft.category, Category::Roads);
        assert_eq!(draft.location.latitude, 1.5);
        assert_eq!(draft.location.longitude, 2.0);
        assert_eq!(draft.location.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn validation_rejects_bad_reports() {
        let missing = CreateIssue {
            title: Some("   ".to_string()),
            ..request()
        };
        assert_eq!(missing.validate().unwrap_err().code, 400);

        let long_title = CreateIssue {
            title: Some("x".repeat(101)),
            ..request()
        };
        assert_eq!(long_title.validate().unwrap_err().code, 400);

        let unknown_category = CreateIssue {
            category: Some("Potholes".to_string()),
            ..request()
        };
        assert_eq!(unknown_category.validate().unwrap_err().code, 400);

        let no_coordinates = CreateIssue {
            location: Some(json!({"address": "Somewhere"})),
            ..request()
        };
        let err = no_coordinates.validate().unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(err.to_string(), "Location coordinates are required");
    }

    #[actix_web::test]
    async fn created_issue_is_pending_with_single_system_history_entry() {
        let env = TestEnv::new();
        let citizen = env.user(Role::Citizen).await;

        let issue = IssueService::new(env.context(Auth::Citizen(citizen)))
            .create(request(), None)
            .await
            .unwrap();

        assert_eq!(issue.status, Status::Pending);
        assert_eq!(issue.status_history.len(), 1);
        assert_eq!(issue.status_history[0].status, Status::Pending);
        assert!(issue.status_history[0].updated_by.is_none());
        assert_eq!(issue.reported_by.user_id, citizen.to_hex());
        assert!(issue.image.url.is_none());
        assert_eq!(issue.admin_notes, "");
    }

    #[actix_web::test]
    async fn failed_creation_removes_stored_image() {
        let env = TestEnv::new();
        let citizen = env.user(Role::Citizen).await;
        let stored = env.media.store(&upload()).await.unwrap();
        assert_eq!(env.media.len(), 1);

        let err = IssueService::new(env.context(Auth::Citizen(citizen)))
            .create(
                CreateIssue {
                    category: Some("Nope".to_string()),
                    ..request()
                },
                Some(stored),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, 400);
        assert!(env.media.is_empty());
        assert!(env.issues.db.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn compensation_failure_keeps_creation_error() {
        let env = TestEnv::new();
        let stored = env.media.store(&upload()).await.unwrap();
        env.media.fail_delete.store(true, Ordering::SeqCst);

        let err = IssueService::new(env.context(Auth::Citizen(ObjectId::new())))
            .create(request(), Some(stored))
            .await
            .unwrap_err();

        assert_eq!(err.code, 401);
        assert_eq!(env.media.delete_attempts.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn persistence_failure_removes_stored_image() {
        let env = TestEnv::new();
        let citizen = env.user(Role::Citizen).await;
        let stored = env.media.store(&upload()).await.unwrap();
        env.issues.fail_insert.store(true, Ordering::SeqCst);

        let err = IssueService::new(env.context(Auth::Citizen(citizen)))
            .create(request(), Some(stored))
            .await
            .unwrap_err();

        assert_eq!(err.code, 500);
        assert!(env.media.is_empty());
        assert!(env.issues.db.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn status_transitions_append_history() {
        let env = TestEnv::new();
        let admin = env.user(Role::Admin).await;
        let citizen = env.user(Role::Citizen).await;
        let issue = env.issue(citizen).await;

        let service = IssueService::new(env.context(Auth::Admin(admin)));
        service
            .transition_status(issue, Some("In-Progress".to_string()))
            .await
            .unwrap();
        let updated = service
            .transition_status(issue, Some("In-Progress".to_string()))
            .await
            .unwrap();

        assert_eq!(updated.status, Status::InProgress);
        assert_eq!(updated.status_history.len(), 3);
        assert_eq!(
            updated.status_history[2].updated_by,
            Some(admin.to_hex())
        );
        assert!(updated.updated_at >= updated.created_at);

        let err = service
            .transition_status(issue, Some("Closed".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(err.to_string(), "Invalid status value");
    }

    #[actix_web::test]
    async fn citizens_cannot_change_status_or_notes() {
        let env = TestEnv::new();
        let citizen = env.user(Role::Citizen).await;
        let issue = env.issue(citizen).await;

        let service = IssueService::new(env.context(Auth::Citizen(citizen)));
        let err = service
            .transition_status(issue, Some("Resolved".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);

        let err = service
            .set_admin_notes(issue, Some("note".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);
    }

    #[actix_web::test]
    async fn blank_notes_are_rejected() {
        let env = TestEnv::new();
        let admin = env.user(Role::Admin).await;
        let issue = env.issue(admin).await;

        let service = IssueService::new(env.context(Auth::Admin(admin)));
        let err = service
            .set_admin_notes(issue, Some("  ".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Notes are required");

        let updated = service
            .set_admin_notes(issue, Some("Crew assigned".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.admin_notes, "Crew assigned");
        assert_eq!(updated.status_history.len(), 1);
    }

    #[actix_web::test]
    async fn public_view_hides_admin_notes() {
        let env = TestEnv::new();
        let admin = env.user(Role::Admin).await;
        let issue = env.issue(admin).await;

        IssueService::new(env.context(Auth::Admin(admin)))
            .set_admin_notes(issue, Some("Internal only".to_string()))
            .await
            .unwrap();

        let view = IssueService::new(env.context(Auth::None))
            .get_by_id(issue, AccessMode::Public)
            .await
            .unwrap();
        assert!(matches!(view, IssueView::Tracked(_)));

        let body = serde_json::to_value(&view).unwrap();
        assert!(body.get("adminNotes").is_none());
        assert_eq!(body["status"], "Pending");
    }

    #[actix_web::test]
    async fn owner_view_is_limited_to_reporter_and_admins() {
        let env = TestEnv::new();
        let reporter = env.user(Role::Citizen).await;
        let other = env.user(Role::Citizen).await;
        let admin = env.user(Role::Admin).await;
        let issue = env.issue(reporter).await;

        let err = IssueService::new(env.context(Auth::Citizen(other)))
            .get_by_id(issue, AccessMode::Owner)
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);

        for auth in [Auth::Citizen(reporter), Auth::Admin(admin)] {
            let view = IssueService::new(env.context(auth))
                .get_by_id(issue, AccessMode::Owner)
                .await
                .unwrap();
            assert!(matches!(view, IssueView::Full(_)));
        }

        let err = IssueService::new(env.context(Auth::Citizen(reporter)))
            .get_by_id(issue, AccessMode::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);
    }

    #[actix_web::test]
    async fn admin_view_names_status_updaters() {
        let env = TestEnv::new();
        let admin = env.user(Role::Admin).await;
        let reporter = env.user(Role::Citizen).await;
        let issue = env.issue(reporter).await;

        let service = IssueService::new(env.context(Auth::Admin(admin)));
        service
            .transition_status(issue, Some("Resolved".to_string()))
            .await
            .unwrap();

        let IssueView::Admin(view) = service.get_by_id(issue, AccessMode::Admin).await.unwrap()
        else {
            panic!("expected the admin view");
        };

        assert!(view.status_history[0].updated_by.is_none());
        let updater = view.status_history[1].updated_by.as_ref().unwrap();
        assert_eq!(updater.id, admin.to_hex());
        assert_eq!(updater.name.as_deref(), Some("admin user"));
        assert!(updater.email.as_deref().unwrap().ends_with("@example.com"));
        assert_eq!(view.reported_by.name, "Reporter");
        assert_eq!(view.reported_by.user_id, reporter.to_hex());
    }

    #[actix_web::test]
    async fn delete_removes_image_then_issue() {
        let env = TestEnv::new();
        let reporter = env.user(Role::Citizen).await;
        let stored = env.media.store(&upload()).await.unwrap();
        let storage_id = stored.storage_id.clone();

        let service = IssueService::new(env.context(Auth::Citizen(reporter)));
        let issue = service.create(request(), Some(stored)).await.unwrap();
        let id: ObjectId = issue.id.parse().unwrap();

        let err = IssueService::new(env.context(Auth::Citizen(ObjectId::new())))
            .delete(id)
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);
        assert!(env.media.contains(&storage_id));

        service.delete(id).await.unwrap();
        assert!(!env.media.contains(&storage_id));
        assert!(env
            .issues
            .find("id", &Bson::ObjectId(id))
            .await
            .unwrap()
            .is_none());

        assert_eq!(service.delete(id).await.unwrap_err().code, 404);
    }

    #[actix_web::test]
    async fn delete_proceeds_when_image_removal_fails() {
        let env = TestEnv::new();
        let admin = env.user(Role::Admin).await;
        let stored = env.media.store(&upload()).await.unwrap();

        let service = IssueService::new(env.context(Auth::Admin(admin)));
        let issue = service.create(request(), Some(stored)).await.unwrap();
        env.media.fail_delete.store(true, Ordering::SeqCst);

        service.delete(issue.id.parse().unwrap()).await.unwrap();
        assert!(env.issues.db.lock().unwrap().is_empty());
        assert_eq!(env.media.len(), 1);
    }

    #[actix_web::test]
    async fn delete_of_concurrently_removed_issue_is_not_found() {
        let env = TestEnv::new();
        let reporter = env.user(Role::Citizen).await;
        let issue = env.issue(reporter).await;
        env.issues.lose_writes.store(true, Ordering::SeqCst);

        let err = IssueService::new(env.context(Auth::Citizen(reporter)))
            .delete(issue)
            .await
            .unwrap_err();

        assert_eq!(err.code, 404);
        assert_eq!(err.to_string(), "Issue not found");
    }

    #[actix_web::test]
    async fn my_issues_lists_only_own_reports_newest_first() {
        let env = TestEnv::new();
        let reporter = env.user(Role::Citizen).await;
        let other = env.user(Role::Citizen).await;

        let first = env.issue(reporter).await;
        env.issue(other).await;
        let second = env.issue(reporter).await;

        let mine = IssueService::new(env.context(Auth::Citizen(reporter)))
            .my_issues()
            .await
            .unwrap();
        let ids: Vec<String> = mine.into_iter().map(|issue| issue.id).collect();
        assert_eq!(ids, vec![second.to_hex(), first.to_hex()]);
    }
}
