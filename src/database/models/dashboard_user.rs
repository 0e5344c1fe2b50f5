use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::Role;
use crate::phone::PhoneKey;

/// A dashboard account. Ids live in their own space, separate from field users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DashboardUserRecord {
    pub id: i64,
    pub phone: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_verified: bool,
}

#[derive(Debug, Clone)]
pub struct NewDashboardUser {
    pub phone: PhoneKey,
    pub name: String,
    pub role: Role,
    pub is_verified: bool,
}
