use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub gender: bool,
    pub dob: Option<NaiveDate>,
    pub vehicle: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserContact {
    pub phone: String,
    pub email: String,
    pub address: String,
    pub district: String,
    pub city: String,
}

/// Everything needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub gender: bool,
    pub dob: Option<NaiveDate>,
    pub vehicle: String,
    pub contact: UserContact,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileUser {
    pub username: String,
    pub display_name: String,
    pub gender: bool,
    pub dob: Option<NaiveDate>,
    pub vehicle: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: ProfileUser,
    pub user_contact: UserContact,
}

impl Profile {
    pub fn new(user: User, user_contact: UserContact) -> Self {
        Self {
            user: ProfileUser {
                username: user.username,
                display_name: user.display_name,
                gender: user.gender,
                dob: user.dob,
                vehicle: user.vehicle,
                created_date: user.created_at,
            },
            user_contact,
        }
    }
}
