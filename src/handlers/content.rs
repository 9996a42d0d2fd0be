use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::models::common::{AccessLevel, ApiResponse, UserRole};
use crate::models::content::{Content, CreateContentRequest};
use crate::models::user::User;
use crate::services::database::DatabaseService;

/// Access gate for a single piece of content. Free content is open to every
/// account; premium content needs a live entitlement. Admins bypass the
/// check entirely.
fn check_access(user: &User, content: &Content, now: DateTime<Utc>) -> Result<(), ApiError> {
    if content.access_level == AccessLevel::Free {
        return Ok(());
    }
    if user.role == UserRole::Admin {
        return Ok(());
    }
    if user.has_premium_access(now) {
        return Ok(());
    }
    Err(ApiError::SubscriptionRequired)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Option<Uuid>,
}

/// Lists published content. Anonymous callers (and callers without a live
/// entitlement) see the free tier only; entitled accounts and admins see
/// everything.
#[get("")]
pub async fn list_contents(
    db: Data<DatabaseService>,
    query: Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let include_premium = match query.user_id {
        Some(user_id) => match db.get_user(&user_id).await? {
            Some(user) => {
                user.role == UserRole::Admin || user.has_premium_access(Utc::now())
            }
            None => false,
        },
        None => false,
    };

    let contents = db.list_published_contents(include_premium).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(contents)))
}

#[get("/{user_id}/{content_id}")]
pub async fn get_content(
    db: Data<DatabaseService>,
    path: Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let (user_id, content_id) = path.into_inner();

    let mut user = db
        .get_user(&user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    let content = db
        .get_content(&content_id)
        .await?
        .ok_or(ApiError::NotFound("Content"))?;

    if !content.is_published {
        return Err(ApiError::NotFound("Content"));
    }

    let now = Utc::now();
    if user.refresh_trial_status(now) {
        db.update_user(&user).await?;
    }

    check_access(&user, &content, now)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(content)))
}

#[post("")]
pub async fn create_content(
    db: Data<DatabaseService>,
    payload: Json<CreateContentRequest>,
) -> Result<HttpResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let user = db
        .get_user(&payload.user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    if user.role != UserRole::Admin {
        return Err(ApiError::Forbidden("Admin access required"));
    }

    let content = Content::new(
        payload.title.clone(),
        payload.body.clone(),
        payload.access_level,
        payload.position.unwrap_or(0),
    );
    db.create_content(&content).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(content)))
}
