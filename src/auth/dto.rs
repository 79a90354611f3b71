use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{auth::repo_types::User, validation::present};

/// Request body for account creation. Fields stay raw JSON so that missing,
/// null and mistyped values are all reported as field errors.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub password: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
}

/// Request body for token issuance. Extra fields such as `name` are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub password: Option<Value>,
}

/// Partial update of the authenticated user.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMeRequest {
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub password: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub email: String,
    pub name: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            name: user.name,
        }
    }
}
