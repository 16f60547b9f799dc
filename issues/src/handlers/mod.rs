pub mod admin;
pub mod issue;
