use std::sync::Arc;

use actix_web::HttpServer;
use mongodb::bson::oid::ObjectId;

use common::{
    auth::TokenKeys, config::Config, context::ServiceState, entities::user::User,
    repository::mongo_repository::MongoRepository,
};
use users::create_app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env(3001).expect("Invalid configuration");

    let user_repo: MongoRepository<User<ObjectId>> =
        MongoRepository::new(&config.mongo_uri, &config.database, "users")
            .await
            .expect("Failed to connect to MongoDB");
    user_repo
        .unique_index("email")
        .await
        .expect("Failed to create users index");

    let mut state = ServiceState::new(TokenKeys::new(&config.jwt_secret, config.token_ttl));
    state.insert::<User<ObjectId>>(Arc::new(user_repo));
    let state = Arc::new(state);

    log::info!("Users service listening on {}:{}", config.host, config.port);

    HttpServer::new(move || create_app(state.clone()))
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}
