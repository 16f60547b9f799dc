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

pub use handlers::auth::*;

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
        .service(register)
        .service(login)
        .service(me)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Arc;

    use chrono::Duration;
    use mongodb::bson::oid::ObjectId;

    use common::{
        auth::{Auth, TokenKeys},
        context::{Context, ServiceState},
        entities::user::User,
        repository::test_repository::TestRepository,
    };

    pub struct TestEnv {
        pub state: Arc<ServiceState>,
        pub users: Arc<TestRepository<User<ObjectId>>>,
    }

    impl TestEnv {
        pub fn new() -> Self {
            let users = Arc::new(TestRepository::<User<ObjectId>>::new());
            let mut state = ServiceState::new(TokenKeys::new("test-secret", Duration::days(7)));
            state.insert::<User<ObjectId>>(users.clone());

            Self {
                state: Arc::new(state),
                users,
            }
        }

        pub fn context(&self, auth: Auth) -> Context {
            Context::new(self.state.clone(), auth)
        }
    }
}
