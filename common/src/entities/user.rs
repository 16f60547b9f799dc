use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{entities::role::Role, repository::Entity};

/// Identity Store record. Credentials never leave the service, see [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User<Id> {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub password: String,
    pub salt: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: i64,
}

impl Entity for User<ObjectId> {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: i64,
}

impl From<User<ObjectId>> for PublicUser {
    fn from(user: User<ObjectId>) -> Self {
        PublicUser {
            id: user.id.to_hex(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            created_at: user.created_at,
        }
    }
}
