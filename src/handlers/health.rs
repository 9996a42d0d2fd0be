use actix_web::web::Data;
use actix_web::HttpResponse;
use serde_json::json;

use crate::services::database::DatabaseService;

pub async fn health_check(db: Data<DatabaseService>) -> HttpResponse {
    match db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "database": "connected",
        })),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "database": "disconnected",
            }))
        }
    }
}
