use std::sync::Arc;

use actix_web::{dev::Payload, web::Data, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use mongodb::bson::{oid::ObjectId, Bson};
use type_map::concurrent::TypeMap;

use crate::{
    auth::{Auth, TokenKeys},
    entities::user::User,
    error::{self, AddCode, ServiceError},
    repository::RepositoryObject,
};

/// Everything a service shares between requests. Built once in `main`, read-only afterwards.
pub struct ServiceState {
    pub repositories: TypeMap,
    pub tokens: TokenKeys,
}

impl ServiceState {
    pub fn new(tokens: TokenKeys) -> Self {
        Self {
            repositories: TypeMap::new(),
            tokens,
        }
    }

    pub fn insert<T: 'static>(&mut self, repository: RepositoryObject<T>) {
        self.repositories.insert(repository);
    }

    pub fn insert_manual<T: Send + Sync + 'static>(&mut self, repository: T) {
        self.repositories.insert(repository);
    }

    pub fn try_get_repository<T: 'static>(&self) -> error::Result<RepositoryObject<T>> {
        self.repositories
            .get::<RepositoryObject<T>>()
            .cloned()
            .ok_or(
                anyhow::anyhow!(
                    "Repository for type {} not found",
                    std::any::type_name::<T>()
                )
                .code(500),
            )
    }

    pub fn try_get_manual<T: Clone + 'static>(&self) -> error::Result<T> {
        self.repositories.get::<T>().cloned().ok_or(
            anyhow::anyhow!("State entry {} not found", std::any::type_name::<T>()).code(500),
        )
    }

    /// Resolves a bearer token to the caller's identity. Missing, invalid or expired
    /// tokens and tokens of deleted users resolve to `Auth::None`; only Identity Store
    /// failures are errors.
    pub async fn resolve_auth(&self, token: Option<&str>) -> error::Result<Auth> {
        let Some(token) = token else {
            log::debug!("No authorization header provided");
            return Ok(Auth::None);
        };

        let user_id = match self.tokens.verify(token) {
            Ok(user_id) => user_id,
            Err(err) => {
                log::warn!("Rejected token: {}", err);
                return Ok(Auth::None);
            }
        };

        let users = self.try_get_repository::<User<ObjectId>>()?;
        match users.find("id", &Bson::ObjectId(user_id)).await? {
            Some(user) => Ok(Auth::from_user(&user)),
            None => {
                log::warn!("Token subject {} no longer exists", user_id);
                Ok(Auth::None)
            }
        }
    }
}

#[derive(Clone)]
pub struct HandlerContext {
    pub user_auth: Auth,
}

#[derive(Clone)]
pub struct Context(pub Arc<ServiceState>, pub HandlerContext);

pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|x| x.to_str().ok())
        .and_then(|x| x.strip_prefix("Bearer ")) // remove prefix
        .map(str::to_string)
}

impl FromRequest for Context {
    type Error = ServiceError;

    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req
            .app_data::<Data<Arc<ServiceState>>>()
            .map(|state| state.get_ref().clone());

        Box::pin(async move {
            let Some(state) = state else {
                return Err(anyhow::anyhow!("No state provided").code(500));
            };

            let user_auth = state.resolve_auth(token.as_deref()).await?;
            Ok(Context(state, HandlerContext { user_auth }))
        })
    }
}

impl Context {
    pub fn new(state: Arc<ServiceState>, user_auth: Auth) -> Self {
        Context(state, HandlerContext { user_auth })
    }

    pub fn auth(&self) -> &Auth {
        &self.1.user_auth
    }

    pub fn state(&self) -> &ServiceState {
        &self.0
    }

    pub fn try_get_repository<T: 'static>(&self) -> error::Result<RepositoryObject<T>> {
        self.0.try_get_repository::<T>()
    }

    pub fn try_get_manual<T: Clone + 'static>(&self) -> error::Result<T> {
        self.0.try_get_manual::<T>()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use mongodb::bson::oid::ObjectId;

    use super::ServiceState;
    use crate::{
        auth::{Auth, TokenKeys},
        entities::{role::Role, user::User},
        repository::{test_repository::TestRepository, Repository},
    };

    fn user(role: Role) -> User<ObjectId> {
        User {
            id: ObjectId::new(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            password: String::new(),
            salt: String::new(),
            phone: None,
            role,
            created_at: Utc::now().timestamp_micros(),
        }
    }

    #[actix_web::test]
    async fn tokens_resolve_to_role_from_identity_store() {
        let users = Arc::new(TestRepository::<User<ObjectId>>::new());
        let mut state = ServiceState::new(TokenKeys::new("secret", Duration::days(7)));
        state.insert::<User<ObjectId>>(users.clone());

        let admin = user(Role::Admin);
        users.insert(&admin).await.unwrap();
        let token = state.tokens.issue(&admin.id).unwrap();
        assert_eq!(
            state.resolve_auth(Some(&token)).await.unwrap(),
            Auth::Admin(admin.id)
        );

        let ghost = state.tokens.issue(&ObjectId::new()).unwrap();
        assert_eq!(state.resolve_auth(Some(&ghost)).await.unwrap(), Auth::None);
        assert_eq!(state.resolve_auth(Some("garbage")).await.unwrap(), Auth::None);
        assert_eq!(state.resolve_auth(None).await.unwrap(), Auth::None);
    }
}
