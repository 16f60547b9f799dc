pub mod form;
pub mod issue;
pub mod triage;
