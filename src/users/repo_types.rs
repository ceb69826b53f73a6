use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PHOTO: &str = "default.jpg";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Guide,
    LeadGuide,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Row as stored in `users`.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
    pub password_hash: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

/// User record. Credential and reset fields never leave the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password changed after a token issued at `iat` (unix seconds).
    pub fn password_changed_after(&self, iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => iat < changed.unix_timestamp(),
            None => false,
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            photo: r.photo,
            role: r.role.parse().map_err(anyhow::Error::msg)?,
            password_hash: r.password_hash,
            password_changed_at: r.password_changed_at,
            reset_token_hash: r.password_reset_token,
            reset_token_expires_at: r.password_reset_expires,
            active: r.active,
            created_at: r.created_at,
        })
    }
}

/// Validated signup data with the password already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}
