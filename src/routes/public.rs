use axum::{
    extract::State,
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::{serde_as, NoneAsEmptyString};

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    models::user::{NewUser, UserContact},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/validate-token", get(validate_token))
}

async fn health() -> Json<Value> {
    Json(json!({ "message": "API working." }))
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    message: String,
    user_id: String,
    username: String,
    display_name: String,
    token: String,
    token_type: &'static str,
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = match auth::authenticate_user(&state, &form.username, &form.password).await {
        Ok(user) => user,
        Err(AppError::Unauthorized) => {
            return Err(AppError::BadRequest("Invalid username or password".into()))
        }
        Err(err) => return Err(err),
    };
    let token = auth::create_session(&state, user.id).await?;

    Ok(Json(LoginResponse {
        message: format!("Log in successful. Welcome {}", user.display_name),
        user_id: user.id.to_string(),
        username: user.username,
        display_name: user.display_name,
        token,
        token_type: "bearer",
    }))
}

#[serde_as]
#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    password: String,
    display_name: String,
    #[serde(default)]
    gender: bool,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    dob: Option<NaiveDate>,
    #[serde(default)]
    vehicle: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    district: String,
    #[serde(default)]
    city: String,
}

async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Json<Value>, AppError> {
    let new_user = NewUser {
        username: form.username,
        password: form.password,
        display_name: form.display_name,
        gender: form.gender,
        dob: form.dob,
        vehicle: form.vehicle,
        contact: UserContact {
            phone: form.phone,
            email: form.email,
            address: form.address,
            district: form.district,
            city: form.city,
        },
    };
    auth::register_user(&state, new_user).await?;
    Ok(Json(json!({ "message": "Register successfully!" })))
}

async fn logout(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<Value>, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AppError::Unauthorized)?;
    auth::destroy_session(&state, bearer.token()).await?;
    Ok(Json(json!({ "message": "Logged out." })))
}

async fn validate_token(current: CurrentUser) -> Result<Json<Value>, AppError> {
    let user = current.require_user()?;
    Ok(Json(json!({ "valid": true, "user_id": user.id })))
}
