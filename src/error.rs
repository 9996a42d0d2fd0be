use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Domain errors surfaced on the HTTP boundary. Every variant maps to a
/// structured `{"success": false, "message": ...}` JSON body; internal faults
/// never leak their detail to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid plan type")]
    InvalidPlan,

    #[error("Payment provider request failed")]
    PaymentProvider(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("No active subscription found")]
    NoActiveSubscription,

    #[error("Premium subscription required")]
    SubscriptionRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPlan | ApiError::InvalidSignature | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            ApiError::NoActiveSubscription | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SubscriptionRequired | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(source) = self {
            log::error!("Internal fault: {:#}", source);
        }
        if let ApiError::PaymentProvider(detail) = self {
            log::error!("Payment provider failure: {}", detail);
        }

        let mut body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });

        // Machine-readable hint so the frontend can redirect to the plans page
        // instead of showing a generic error.
        if matches!(self, ApiError::SubscriptionRequired) {
            body["requiresSubscription"] = serde_json::json!(true);
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}
