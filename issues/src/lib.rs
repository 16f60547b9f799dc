pub mod handlers;
pub mod service;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::ServiceFactory;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::middleware;
use actix_web::web;
use actix_web::App;
use common::context::ServiceState;
use common::error::{json_config, query_config};

pub use handlers::admin::*;
pub use handlers::issue::*;

pub fn create_app(
    state: Arc<ServiceState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    >,
> {
    let cors = Cors::permissive();
    App::new()
        .wrap(cors)
        .wrap(middleware::Logger::default())
        .app_data(web::Data::new(state))
        .app_data(json_config())
        .app_data(query_config())
        .service(post_issue)
        .service(get_my_issues)
        .service(track_issue)
        .service(get_issue)
        .service(delete_issue)
        .service(get_admin_issues)
        .service(get_admin_stats)
        .service(get_admin_issue)
        .service(patch_issue_status)
        .service(patch_issue_notes)
        .service(delete_admin_issue)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    };

    use chrono::{Duration, Utc};
    use mongodb::bson::oid::ObjectId;

    use common::{
        auth::{Auth, TokenKeys},
        context::{Context, ServiceState},
        entities::{
            issue::{Category, Issue, IssueDraft, IssueImage, Location, Reporter},
            role::Role,
            user::User,
        },
        media::{test_store::TestMediaStore, MediaStoreObject},
        repository::{test_repository::TestRepository, IssueRepositoryObject, Repository},
    };

    /// Service state wired to in-memory stores, with handles kept for assertions.
    pub struct TestEnv {
        pub state: Arc<ServiceState>,
        pub issues: Arc<TestRepository<Issue<ObjectId>>>,
        pub users: Arc<TestRepository<User<ObjectId>>>,
        pub media: Arc<TestMediaStore>,
        clock: AtomicI64,
    }

    impl TestEnv {
        pub fn new() -> Self {
            let issues = Arc::new(TestRepository::<Issue<ObjectId>>::new());
            let users = Arc::new(TestRepository::<User<ObjectId>>::new());
            let media = Arc::new(TestMediaStore::new());

            let mut state = ServiceState::new(TokenKeys::new("test-secret", Duration::days(7)));
            state.insert_manual::<IssueRepositoryObject>(issues.clone());
            state.insert::<User<ObjectId>>(users.clone());
            state.insert_manual::<MediaStoreObject>(media.clone());

            Self {
                state: Arc::new(state),
                issues,
                users,
                media,
                clock: AtomicI64::new(Utc::now().timestamp_micros()),
            }
        }

        pub async fn user(&self, role: Role) -> ObjectId {
            let user = User {
                id: ObjectId::new(),
                name: format!("{} user", role.stringify()),
                email: format!("{}@example.com", ObjectId::new().to_hex()),
                password: String::new(),
                salt: String::new(),
                phone: None,
                role,
                created_at: Utc::now().timestamp_micros(),
            };
            self.users.insert(&user).await.unwrap();
            user.id
        }

        pub fn token(&self, user_id: ObjectId) -> String {
            format!("Bearer {}", self.state.tokens.issue(&user_id).unwrap())
        }

        pub fn context(&self, auth: Auth) -> Context {
            Context::new(self.state.clone(), auth)
        }

        pub async fn issue(&self, reporter: ObjectId) -> ObjectId {
            self.issue_with(reporter, "Overflowing garbage bin", Category::Sanitation)
                .await
        }

        /// Inserts an issue directly; each one is created one second after the last.
        pub async fn issue_with(
            &self,
            reporter: ObjectId,
            title: &str,
            category: Category,
        ) -> ObjectId {
            let now = self.clock.fetch_add(1_000_000, Ordering::SeqCst);
            let issue = Issue::new(
                IssueDraft {
                    title: title.to_string(),
                    description: "Reported from the test suite".to_string(),
                    category,
                    location: Location {
                        latitude: 28.61,
                        longitude: 77.2,
                        address: "Connaught Place".to_string(),
                    },
                },
                Reporter {
                    user_id: reporter,
                    name: "Reporter".to_string(),
                    email: "reporter@example.com".to_string(),
                },
                IssueImage::default(),
                now,
            );
            self.issues.insert(&issue).await.unwrap();
            issue.id
        }
    }
}
