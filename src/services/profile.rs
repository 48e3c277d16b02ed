use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::info;

use crate::{
    db::DbPool,
    error::AppError,
    models::user::{Profile, User, UserContact},
};

/// Profile form after decoding. `None` means "leave as is", except for
/// `gender`, which the form always carries.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub gender: bool,
    pub dob: Option<NaiveDate>,
    pub vehicle: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Strips markup tags and ASCII punctuation, then collapses whitespace.
pub fn sanitize(input: &str) -> String {
    let without_tags = tag_pattern().replace_all(input.trim(), "");
    without_tags
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone)]
pub struct ProfileService {
    db: DbPool,
}

impl ProfileService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn load(&self, user_id: i64) -> Result<Profile, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, uuid, username, password_hash, display_name, gender, dob, vehicle,
                   created_at, last_login_at
            FROM users WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)?;

        let contact = sqlx::query_as::<_, UserContact>(
            "SELECT phone, email, address, district, city FROM user_contacts WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(Profile::new(user, contact))
    }

    pub async fn update(&self, user_id: i64, update: ProfileUpdate) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        // Write first: the transaction holds the write lock from its first statement.
        let result = sqlx::query(
            r#"
            UPDATE users SET
                display_name = COALESCE(?1, display_name),
                dob = COALESCE(?2, dob),
                vehicle = COALESCE(?3, vehicle),
                gender = ?4
            WHERE id = ?5
            "#,
        )
        .bind(update.display_name.as_deref().map(sanitize))
        .bind(update.dob)
        .bind(update.vehicle.as_deref().map(sanitize))
        .bind(update.gender)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE user_contacts SET
                email = COALESCE(?1, email),
                phone = COALESCE(?2, phone),
                address = COALESCE(?3, address),
                city = COALESCE(?4, city),
                district = COALESCE(?5, district)
            WHERE user_id = ?6
            "#,
        )
        .bind(update.email.as_deref().map(str::trim))
        .bind(update.phone.as_deref().map(sanitize))
        .bind(update.address.as_deref().map(str::trim))
        .bind(update.city.as_deref())
        .bind(update.district.as_deref())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(user_id, "profile updated");
        Ok(())
    }
}
