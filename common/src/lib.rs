pub mod access_rules;
pub mod auth;
pub mod config;
pub mod context;
pub mod entities;
pub mod error;
pub mod media;
pub mod repository;

use std::str::FromStr;

use mongodb::bson::oid::ObjectId;

use crate::error::AddCode;

/// Parses a hex identifier taken from a request path.
pub fn parse_id(id: &str) -> error::Result<ObjectId> {
    ObjectId::from_str(id).map_err(|_| anyhow::anyhow!("Invalid id: {}", id).code(400))
}
