use std::{env, sync::Arc};

use mongodb::bson::oid::ObjectId;

use common::{
    auth::{Auth, TokenKeys},
    config::Config,
    context::{Context, ServiceState},
    entities::{role::Role, user::User},
    repository::mongo_repository::MongoRepository,
};
use users::service::auth::{AuthService, RegisterRequest};

fn setting(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Creates the first administrator. Running it again is harmless.
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env(3001)?;
    let email = setting("ADMIN_EMAIL", "admin@civic.com");

    let user_repo: MongoRepository<User<ObjectId>> =
        MongoRepository::new(&config.mongo_uri, &config.database, "users")
            .await
            .map_err(|err| err.err)?;

    let mut state = ServiceState::new(TokenKeys::new(&config.jwt_secret, config.token_ttl));
    state.insert::<User<ObjectId>>(Arc::new(user_repo));
    let context = Context::new(Arc::new(state), Auth::None);

    let request = RegisterRequest {
        name: Some(setting("ADMIN_NAME", "Admin User")),
        email: Some(email.clone()),
        password: Some(setting("ADMIN_PASSWORD", "admin123")),
        phone: Some(setting("ADMIN_PHONE", "1234567890")),
    };

    match AuthService::new(context)
        .create_account(request, Role::Admin)
        .await
    {
        Ok(admin) => {
            log::info!("Admin user {} created with email {}", admin.id, admin.email);
            log::warn!("Please change the admin password after first login");
        }
        Err(err) if err.code == 400 && err.to_string() == "Email already registered" => {
            log::warn!("Admin user {} already exists", email);
        }
        Err(err) => return Err(err.err),
    }

    Ok(())
}
