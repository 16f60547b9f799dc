use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "Citizen")]
    Citizen,
    #[serde(alias = "Admin")]
    Admin,
}

impl Role {
    pub fn stringify(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Admin => "admin",
        }
    }
}
