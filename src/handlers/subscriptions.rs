use actix_web::web::{Data, Json, Path};
use actix_web::{get, post, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::common::{ApiResponse, PlanType};
use crate::services::database::DatabaseService;
use crate::services::stripe::StripeService;

const PAYMENT_HISTORY_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub plan_type: String,
}

/// Starts a hosted checkout for a premium plan. The provider-side customer is
/// created on first checkout and the reference persisted before the session
/// is created, so a session failure never orphans the customer.
#[post("/checkout")]
pub async fn create_checkout(
    db: Data<DatabaseService>,
    stripe: Data<StripeService>,
    payload: Json<CheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let plan = PlanType::parse(&payload.plan_type).ok_or(ApiError::InvalidPlan)?;

    let mut user = db
        .get_user(&payload.user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let customer_id = match &user.stripe_customer_id {
        Some(id) => id.clone(),
        None => {
            let id = stripe
                .create_customer(&user.email, &user.name, &user.id)
                .await
                .map_err(|e| ApiError::PaymentProvider(e.to_string()))?;
            user.set_stripe_customer_id(id.clone());
            db.update_user(&user).await?;
            id
        }
    };

    let session = stripe
        .create_checkout_session(&customer_id, &user.id, plan)
        .await
        .map_err(|e| ApiError::PaymentProvider(e.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// Responds 200 with null data when there is no active subscription; only
/// the cancel flow treats that state as an error.
#[get("/{user_id}/current")]
pub async fn get_current_subscription(
    db: Data<DatabaseService>,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let subscription = db.get_active_subscription_by_user(&user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(subscription)))
}

/// Cancellation is deferred: the provider is told to stop renewing, the local
/// record keeps its active status, and access runs until the period end. The
/// terminal state lands when the provider sends the deletion event.
#[post("/{user_id}/cancel")]
pub async fn cancel_subscription(
    db: Data<DatabaseService>,
    stripe: Data<StripeService>,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let mut subscription = db
        .get_active_subscription_by_user(&user_id)
        .await?
        .ok_or(ApiError::NoActiveSubscription)?;

    if !subscription.cancel_at_period_end {
        stripe
            .cancel_at_period_end(&subscription.stripe_subscription_id)
            .await
            .map_err(|e| ApiError::PaymentProvider(e.to_string()))?;

        subscription.cancel(false);
        db.update_subscription(&subscription).await?;
    }

    log::info!(
        "Subscription {} will cancel at period end ({})",
        subscription.stripe_subscription_id,
        subscription.current_period_end
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        subscription,
        "Subscription will be cancelled at the end of the billing period".to_string(),
    )))
}

#[get("/{user_id}/payments")]
pub async fn get_payment_history(
    db: Data<DatabaseService>,
    path: Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let payments = db
        .get_recent_payments_by_user(&user_id, PAYMENT_HISTORY_LIMIT)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(payments)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use chrono::{Duration, Utc};

    use crate::models::subscription::Subscription;

    #[actix_web::test]
    async fn test_current_subscription_is_null_when_none_active() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .service(get_current_subscription),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/{}/current", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        // No subscription is not an error state here: 200 with null data.
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert!(body["data"].is_null());
    }

    #[actix_web::test]
    async fn test_current_subscription_returns_active_record() {
        let db = DatabaseService::new("memory://").await.unwrap();
        let user_id = Uuid::new_v4();

        let now = Utc::now();
        let subscription = Subscription::new(
            user_id,
            PlanType::Monthly,
            "sub_1".to_string(),
            "price_monthly".to_string(),
            now,
            now,
            now + Duration::days(30),
        );
        db.create_subscription(&subscription).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .service(get_current_subscription),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/{}/current", user_id))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["stripe_subscription_id"], "sub_1");
        assert_eq!(body["data"]["status"], "active");
    }
}
