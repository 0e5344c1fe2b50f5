use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::phone::PhoneKey;

/// A registered field user (teacher)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub phone: String,
    pub name: String,
    pub school: String,
    pub district: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: PhoneKey,
    pub name: String,
    pub school: String,
    pub district: String,
    pub language: String,
}
