pub mod issue;
pub mod role;
pub mod user;
