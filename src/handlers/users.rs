use actix_web::web::{Data, Json, Path};
use actix_web::{get, post, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::ApiError;
use crate::models::common::ApiResponse;
use crate::models::user::{CreateUserRequest, User};
use crate::services::database::DatabaseService;
use crate::services::email::EmailService;

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    #[serde(rename = "hasPremiumAccess")]
    pub has_premium_access: bool,
}

/// Registration starts the free trial immediately; there is no separate
/// trial-activation step.
#[post("/register")]
pub async fn register_user(
    db: Data<DatabaseService>,
    email: Data<EmailService>,
    config: Data<Config>,
    payload: Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if db.get_user_by_email(&payload.email).await?.is_some() {
        return Err(ApiError::Validation("Email already registered".to_string()));
    }

    let mut user = User::new(payload.name.clone(), payload.email.clone());
    user.start_trial(config.app.trial_period_days, Utc::now());
    db.create_user(&user).await?;

    log::info!("Registered user {} with trial until {:?}", user.id, user.trial_end_date);

    let mailer = email.get_ref().clone();
    let (to, name, trial_days) = (user.email.clone(), user.name.clone(), config.app.trial_period_days);
    tokio::spawn(async move {
        mailer.send_welcome(&to, &name, trial_days).await;
    });

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        user,
        "User registered, trial started".to_string(),
    )))
}

#[get("/{user_id}")]
pub async fn get_user(
    db: Data<DatabaseService>,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let mut user = db
        .get_user(&user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let now = Utc::now();
    if user.refresh_trial_status(now) {
        db.update_user(&user).await?;
    }

    let has_premium_access = user.has_premium_access(now);
    Ok(HttpResponse::Ok().json(ApiResponse::success(ProfileResponse {
        user,
        has_premium_access,
    })))
}
