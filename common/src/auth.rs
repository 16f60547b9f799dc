use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{role::Role, user::User},
    error::{self, AddCode},
};

/// Resolved identity of the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Auth {
    Admin(ObjectId),
    Citizen(ObjectId),
    None,
}

impl Auth {
    pub fn from_user(user: &User<ObjectId>) -> Self {
        match user.role {
            Role::Admin => Auth::Admin(user.id),
            Role::Citizen => Auth::Citizen(user.id),
        }
    }

    pub fn id(&self) -> Option<&ObjectId> {
        match self {
            Auth::Admin(id) => Some(id),
            Auth::Citizen(id) => Some(id),
            Auth::None => None,
        }
    }

    /// The caller's id, or 401 when the request carried no valid identity.
    pub fn require_id(&self) -> error::Result<ObjectId> {
        self.id()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Not authorized, no valid token").code(401))
    }

    pub fn full_access(&self) -> bool {
        matches!(self, Auth::Admin(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub exp: i64,
}

/// Signing material for identity tokens. Tokens carry only the user id; the role is
/// looked up in the Identity Store on every request.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: &ObjectId) -> error::Result<String> {
        let header = Header {
            alg: Algorithm::HS512,
            ..Default::default()
        };
        let claims = Claims {
            user_id: user_id.to_hex(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        encode(&header, &claims, &self.encoding)
            .map_err(|err| anyhow::anyhow!("Failed to encode token: {}", err).code(500))
    }

    pub fn verify(&self, token: &str) -> error::Result<ObjectId> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS512))
            .map_err(|err| anyhow::anyhow!("Invalid token: {}", err).code(401))?;

        data.claims
            .user_id
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid token subject").code(401))
    }
}
