use axum::{
    extract::State,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use serde_with::{serde_as, NoneAsEmptyString};

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    models::user::Profile,
    services::profile::ProfileUpdate,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/update-profile", post(update_profile))
        .route("/update-password", post(update_password))
}

async fn profile(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Profile>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.profiles.load(user.id).await?))
}

/// Empty form fields mean "keep the stored value".
#[serde_as]
#[derive(Deserialize)]
struct ProfileForm {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    gender: bool,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    dob: Option<NaiveDate>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    vehicle: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    email: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    phone: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    address: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    city: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    district: Option<String>,
}

impl From<ProfileForm> for ProfileUpdate {
    fn from(form: ProfileForm) -> Self {
        Self {
            display_name: form.display_name,
            gender: form.gender,
            dob: form.dob,
            vehicle: form.vehicle,
            email: form.email,
            phone: form.phone,
            address: form.address,
            city: form.city,
            district: form.district,
        }
    }
}

async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> Result<Json<Value>, AppError> {
    let user = current.require_user()?;
    state.profiles.update(user.id, form.into()).await?;
    Ok(Json(json!({ "message": "Profile updated successfully." })))
}

#[derive(Deserialize)]
struct PasswordForm {
    current_pwd: String,
    new_pwd: String,
    cf_new_pwd: String,
}

async fn update_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<PasswordForm>,
) -> Result<Json<Value>, AppError> {
    let user = current.require_user()?;
    auth::change_password(
        &state,
        user.id,
        &form.current_pwd,
        &form.new_pwd,
        &form.cf_new_pwd,
    )
    .await?;
    Ok(Json(json!({ "message": "Password is updated successfully!" })))
}
