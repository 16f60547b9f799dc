use std::sync::Arc;

use actix_web::HttpServer;
use mongodb::bson::oid::ObjectId;

use common::{
    auth::TokenKeys,
    config::Config,
    context::ServiceState,
    entities::{issue::Issue, user::User},
    media::{cloudinary::CloudinaryStore, MediaStoreObject},
    repository::{mongo_repository::MongoRepository, IssueRepositoryObject},
};
use issues::create_app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env(3002).expect("Invalid configuration");
    let media = config
        .media
        .clone()
        .expect("CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET must be set");

    let issue_repo: MongoRepository<Issue<ObjectId>> =
        MongoRepository::new(&config.mongo_uri, &config.database, "issues")
            .await
            .expect("Failed to connect to MongoDB");
    let user_repo: MongoRepository<User<ObjectId>> =
        MongoRepository::new(&config.mongo_uri, &config.database, "users")
            .await
            .expect("Failed to connect to MongoDB");

    let mut state = ServiceState::new(TokenKeys::new(&config.jwt_secret, config.token_ttl));
    state.insert_manual::<IssueRepositoryObject>(Arc::new(issue_repo));
    state.insert::<User<ObjectId>>(Arc::new(user_repo));
    state.insert_manual::<MediaStoreObject>(Arc::new(CloudinaryStore::new(media)));
    let state = Arc::new(state);

    log::info!("Issues service listening on {}:{}", config.host, config.port);

    HttpServer::new(move || create_app(state.clone()))
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}
