use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::DieselUlid;
use crate::schema::users;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(primary_key(id))]
pub struct User {
    pub id: DieselUlid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: DieselUlid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

impl NewUser {
    /// Hashes `password` with argon2 before storing it — mirrors the
    /// teacher's `AuthService::hash_password`, swapped to argon2.
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl AsRef<str>) -> anyhow::Result<Self> {
        Ok(Self {
            id: DieselUlid::new(),
            username: username.into(),
            email: email.into(),
            password_hash: hash_password(password.as_ref())?,
            is_active: true,
        })
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Minimal projection used by the Planner: it never needs password material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveUser {
    pub id: DieselUlid,
    pub username: String,
    pub email: String,
}
