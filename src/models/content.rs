use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::models::common::AccessLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub access_level: AccessLevel,
    pub is_published: bool,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContentRequest {
    pub user_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    pub body: String,
    pub access_level: AccessLevel,
    pub position: Option<u32>,
}

impl Content {
    pub fn new(title: String, body: String, access_level: AccessLevel, position: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            body,
            access_level,
            is_published: true,
            position,
            created_at: now,
            updated_at: now,
        }
    }
}
