use chrono::Utc;
use mongodb::bson::{oid::ObjectId, Bson};
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};

use common::{
    context::Context,
    entities::{
        role::Role,
        user::{PublicUser, User},
    },
    error::{self, AddCode},
};

pub const MIN_PASSWORD_LEN: usize = 6;
const SALT_LEN: usize = 10;
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    pub user: PublicUser,
    pub token: String,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_email(email: Option<String>) -> Option<String> {
    present(email).map(|email| email.to_lowercase())
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut salted = password.to_string();
    salted.push_str(salt);
    sha256::digest(salted)
}

fn verify_password(password: &str, user: &User<ObjectId>) -> bool {
    hash_password(password, &user.salt) == user.password
}

pub struct AuthService {
    context: Context,
}

impl AuthService {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Validates and stores a new account with the given role.
    pub async fn create_account(
        &self,
        request: RegisterRequest,
        role: Role,
    ) -> error::Result<User<ObjectId>> {
        let (Some(name), Some(email), Some(password)) = (
            present(request.name),
            normalize_email(request.email),
            request.password.filter(|password| !password.is_empty()),
        ) else {
            return Err(anyhow::anyhow!("Missing fields").code(400));
        };

        if !Regex::new(EMAIL_PATTERN)?.is_match(&email) {
            return Err(anyhow::anyhow!("Invalid email address").code(400));
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(anyhow::anyhow!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )
            .code(400));
        }

        let users = self.context.try_get_repository::<User<ObjectId>>()?;
        if users
            .find("email", &Bson::String(email.clone()))
            .await?
            .is_some()
        {
            return Err(anyhow::anyhow!("Email already registered").code(400));
        }

        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LEN)
            .map(char::from)
            .collect();

        let user = User {
            id: ObjectId::new(),
            name,
            email,
            password: hash_password(&password, &salt),
            salt,
            phone: present(request.phone),
            role,
            created_at: Utc::now().timestamp_micros(),
        };

        if !users.insert(&user).await? {
            return Err(anyhow::anyhow!("User {} already exists", user.id).code(500));
        }

        log::info!("Registered {} account {}", role.stringify(), user.id);
        Ok(user)
    }

    /// Self-service sign-up always yields a citizen.
    pub async fn register(&self, request: RegisterRequest) -> error::Result<Session> {
        let user = self.create_account(request, Role::Citizen).await?;
        let token = self.context.state().tokens.issue(&user.id)?;

        Ok(Session {
            user: user.into(),
            token,
        })
    }

    pub async fn login(&self, request: LoginRequest) -> error::Result<Session> {
        let (Some(email), Some(password)) = (
            normalize_email(request.email),
            request.password.filter(|password| !password.is_empty()),
        ) else {
            return Err(anyhow::anyhow!("Missing email or password").code(400));
        };

        let users = self.context.try_get_repository::<User<ObjectId>>()?;
        let Some(user) = users.find("email", &Bson::String(email)).await? else {
            return Err(anyhow::anyhow!("Invalid credentials").code(401));
        };

        if !verify_password(&password, &user) {
            log::warn!("Failed login for {}", user.id);
            return Err(anyhow::anyhow!("Invalid credentials").code(401));
        }

        let token = self.context.state().tokens.issue(&user.id)?;
        Ok(Session {
            user: user.into(),
            token,
        })
    }

    pub async fn me(&self) -> error::Result<PublicUser> {
        let id = self.context.auth().require_id()?;

        let users = self.context.try_get_repository::<User<ObjectId>>()?;
        let Some(user) = users.find("id", &Bson::ObjectId(id)).await? else {
            return Err(anyhow::anyhow!("User not found").code(404));
        };

        Ok(user.into())
    }
}
