use actix_web::web::{Bytes, Data};
use actix_web::{post, HttpRequest, HttpResponse};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::{Config, PlanTable};
use crate::error::ApiError;
use crate::models::common::PlanType;
use crate::models::subscription::{Subscription, SubscriptionStatus};
use crate::models::user::{AccountStatus, User};
use crate::models::payment::Payment;
use crate::models::webhook::{CheckoutSessionObject, InvoiceObject, StripeEvent, SubscriptionObject};
use crate::services::database::DatabaseService;
use crate::services::email::EmailService;
use crate::services::stripe::StripeService;

/// Webhook entry point. The signature check runs on the raw bytes before any
/// parsing; an unverified payload is never deserialized. Handlers are
/// idempotent, so a redelivered event acknowledges without side effects, and
/// a processing fault returns 5xx so the provider retries.
#[post("/stripe")]
pub async fn stripe_webhook(
    db: Data<DatabaseService>,
    stripe: Data<StripeService>,
    email: Data<EmailService>,
    config: Data<Config>,
    req: HttpRequest,
    payload: Bytes,
) -> Result<HttpResponse, ApiError> {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;

    if !stripe.verify_webhook_signature(&payload, signature) {
        log::warn!("Rejected webhook with invalid signature");
        return Err(ApiError::InvalidSignature);
    }

    let event: StripeEvent = serde_json::from_slice(&payload)
        .map_err(|e| ApiError::Validation(format!("Invalid webhook payload: {}", e)))?;

    log::info!("Processing webhook event {} ({})", event.id, event.event_type);

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = parse_object(event.data.object)?;
            match session.subscription.clone() {
                Some(subscription_id) => {
                    // The session object lacks billing-period fields; fetch
                    // the full subscription before reconciling.
                    let provider_sub = stripe
                        .retrieve_subscription(&subscription_id)
                        .await
                        .map_err(|e| ApiError::PaymentProvider(e.to_string()))?;
                    apply_checkout_completed(
                        &db,
                        &email,
                        &config.stripe.plans,
                        session,
                        provider_sub,
                    )
                    .await?;
                }
                None => {
                    // One-time-payment sessions carry no subscription; they
                    // are not ours to reconcile.
                    log::debug!("Checkout session {} has no subscription, ignoring", session.id);
                }
            }
        }
        "invoice.payment_succeeded" => {
            apply_payment_succeeded(&db, parse_object(event.data.object)?).await?;
        }
        "invoice.payment_failed" => {
            apply_payment_failed(&db, &email, parse_object(event.data.object)?).await?;
        }
        "customer.subscription.deleted" => {
            apply_subscription_deleted(&db, &email, parse_object(event.data.object)?).await?;
        }
        "customer.subscription.updated" => {
            apply_subscription_updated(&db, parse_object(event.data.object)?).await?;
        }
        other => {
            log::debug!("Ignoring webhook event type {}", other);
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}

fn parse_object<T: DeserializeOwned>(object: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(object)
        .map_err(|e| ApiError::Validation(format!("Malformed event object: {}", e)))
}

async fn resolve_user(
    db: &DatabaseService,
    metadata_user_id: Option<&str>,
    customer_id: Option<&str>,
) -> Result<Option<User>> {
    if let Some(raw) = metadata_user_id {
        if let Ok(user_id) = raw.parse() {
            if let Some(user) = db.get_user(&user_id).await? {
                return Ok(Some(user));
            }
        }
    }
    if let Some(customer) = customer_id {
        return db.get_user_by_customer_ref(customer).await;
    }
    Ok(None)
}

async fn set_user_status(db: &DatabaseService, mut user: User, status: AccountStatus) -> Result<()> {
    if user.subscription_status != status {
        user.set_subscription_status(status);
        db.update_user(&user).await?;
    }
    Ok(())
}

/// Materializes the local subscription for a completed checkout. Keyed on the
/// provider subscription id: a redelivered event finds the existing record
/// and stops. A lingering active subscription from an earlier plan is
/// superseded (cancelled) before the new one is inserted.
pub async fn apply_checkout_completed(
    db: &DatabaseService,
    email: &EmailService,
    plans: &PlanTable,
    session: CheckoutSessionObject,
    provider_sub: SubscriptionObject,
) -> Result<()> {
    if db
        .get_subscription_by_stripe_id(&provider_sub.id)
        .await?
        .is_some()
    {
        log::info!("Subscription {} already recorded, skipping", provider_sub.id);
        return Ok(());
    }

    let resolved = resolve_user(
        db,
        session.metadata.user_id.as_deref(),
        session.customer.as_deref(),
    )
    .await?;
    let Some(mut user) = resolved else {
        // A retry cannot resolve an account we never created; acknowledge
        // instead of making the provider redeliver.
        log::warn!("No account matches checkout session {}, skipping", session.id);
        return Ok(());
    };

    let plan = session
        .metadata
        .plan_type
        .as_deref()
        .and_then(PlanType::parse)
        .or_else(|| plan_for_price(plans, provider_sub.price_id()))
        .ok_or_else(|| anyhow!("Cannot determine plan for session {}", session.id))?;

    if let Some(mut previous) = db.get_active_subscription_by_user(&user.id).await? {
        previous
            .mark_cancelled(Utc::now())
            .map_err(|e| anyhow!(e))?;
        db.update_subscription(&previous).await?;
        log::info!(
            "Superseded subscription {} for user {}",
            previous.stripe_subscription_id,
            user.id
        );
    }

    let price_id = provider_sub
        .price_id()
        .unwrap_or(plans.get(plan).price_id.as_str())
        .to_string();
    let subscription = Subscription::new(
        user.id,
        plan,
        provider_sub.id.clone(),
        price_id,
        provider_sub.start_date(),
        provider_sub.period_start(),
        provider_sub.period_end(),
    );

    if let Err(e) = db.create_subscription(&subscription).await {
        // Concurrent delivery may have won the insert; the unique index on
        // the provider id makes that the only benign failure.
        if db
            .get_subscription_by_stripe_id(&provider_sub.id)
            .await?
            .is_some()
        {
            return Ok(());
        }
        return Err(e);
    }

    if user.stripe_customer_id.is_none() {
        if let Some(customer) = session.customer.clone() {
            user.set_stripe_customer_id(customer);
        }
    }
    user.set_subscription_status(AccountStatus::Active);
    db.update_user(&user).await?;

    email
        .send_subscription_confirmed(&user.email, &user.name, &plans.get(plan).name)
        .await;

    log::info!(
        "Activated {} subscription {} for user {}",
        plan,
        subscription.stripe_subscription_id,
        user.id
    );
    Ok(())
}

fn plan_for_price(plans: &PlanTable, price_id: Option<&str>) -> Option<PlanType> {
    let price_id = price_id?;
    if plans.monthly.price_id == price_id {
        Some(PlanType::Monthly)
    } else if plans.yearly.price_id == price_id {
        Some(PlanType::Yearly)
    } else {
        None
    }
}

/// Records a ledger entry for a paid invoice and re-activates a past-due
/// subscription. The payment-intent reference is the idempotency key: a
/// redelivery finds the existing entry and stops before any state change.
pub async fn apply_payment_succeeded(db: &DatabaseService, invoice: InvoiceObject) -> Result<()> {
    let Some(intent_id) = invoice.payment_intent.clone() else {
        log::warn!("Invoice {} has no payment intent, skipping", invoice.id);
        return Ok(());
    };

    if db.get_payment_by_intent_ref(&intent_id).await?.is_some() {
        log::info!("Payment {} already recorded, skipping", intent_id);
        return Ok(());
    }

    let user = resolve_user(db, None, invoice.customer.as_deref()).await?;
    let Some(user) = user else {
        log::warn!("No account matches invoice {} customer", invoice.id);
        return Ok(());
    };

    let mut subscription_id = None;
    if let Some(stripe_sub_id) = &invoice.subscription {
        if let Some(mut subscription) = db.get_subscription_by_stripe_id(stripe_sub_id).await? {
            if subscription.status == SubscriptionStatus::PastDue {
                subscription
                    .transition_to(SubscriptionStatus::Active)
                    .map_err(|e| anyhow!(e))?;
                db.update_subscription(&subscription).await?;
                log::info!("Re-activated past-due subscription {}", stripe_sub_id);
            }
            subscription_id = Some(subscription.id);
        }
    }

    let payment = Payment::succeeded(
        user.id,
        subscription_id,
        intent_id.clone(),
        Some(invoice.id.clone()),
        invoice.amount_paid,
        invoice.currency.clone(),
        invoice.hosted_invoice_url.clone(),
        invoice.paid_at(),
    );
    if let Err(e) = db.create_payment(&payment).await {
        if db.get_payment_by_intent_ref(&intent_id).await?.is_some() {
            return Ok(());
        }
        return Err(e);
    }

    if subscription_id.is_some() {
        set_user_status(db, user, AccountStatus::Active).await?;
    }

    log::info!("Recorded payment {} for invoice {}", intent_id, invoice.id);
    Ok(())
}

/// A failed renewal demotes the subscription to past-due. Access is revoked
/// immediately through the account's cached status; the provider keeps
/// retrying the charge and a later `invoice.payment_succeeded` restores it.
pub async fn apply_payment_failed(
    db: &DatabaseService,
    email: &EmailService,
    invoice: InvoiceObject,
) -> Result<()> {
    if let Some(stripe_sub_id) = &invoice.subscription {
        if let Some(mut subscription) = db.get_subscription_by_stripe_id(stripe_sub_id).await? {
            if subscription.status == SubscriptionStatus::Active {
                subscription
                    .transition_to(SubscriptionStatus::PastDue)
                    .map_err(|e| anyhow!(e))?;
                db.update_subscription(&subscription).await?;
                log::warn!("Subscription {} is past due", stripe_sub_id);
            }
        }
    }

    if let Some(user) = resolve_user(db, None, invoice.customer.as_deref()).await? {
        let (to, name) = (user.email.clone(), user.name.clone());
        set_user_status(db, user, AccountStatus::PastDue).await?;
        email.send_payment_failed(&to, &name).await;
    }

    Ok(())
}

/// Terminal cancellation, arriving at period end after a deferred cancel or
/// immediately on provider-side deletion. Already-terminal records make a
/// redelivery a no-op.
pub async fn apply_subscription_deleted(
    db: &DatabaseService,
    email: &EmailService,
    provider_sub: SubscriptionObject,
) -> Result<()> {
    let Some(mut subscription) = db.get_subscription_by_stripe_id(&provider_sub.id).await? else {
        log::warn!("Unknown subscription {} deleted, skipping", provider_sub.id);
        return Ok(());
    };

    if subscription.status.is_terminal() {
        log::info!("Subscription {} already terminal, skipping", provider_sub.id);
        return Ok(());
    }

    subscription
        .mark_cancelled(Utc::now())
        .map_err(|e| anyhow!(e))?;
    db.update_subscription(&subscription).await?;

    if let Some(user) = db.get_user(&subscription.user_id).await? {
        let (to, name) = (user.email.clone(), user.name.clone());
        set_user_status(db, user, AccountStatus::Cancelled).await?;
        email.send_subscription_cancelled(&to, &name).await;
    }

    log::info!("Cancelled subscription {}", provider_sub.id);
    Ok(())
}

/// Mirrors provider-side subscription changes: billing period, the
/// cancel-at-period-end flag, and the status. The provider's status is taken
/// verbatim when the transition graph admits it; an inadmissible transition
/// (e.g. out of a terminal state) is logged and dropped.
pub async fn apply_subscription_updated(
    db: &DatabaseService,
    provider_sub: SubscriptionObject,
) -> Result<()> {
    let Some(mut subscription) = db.get_subscription_by_stripe_id(&provider_sub.id).await? else {
        log::warn!("Unknown subscription {} updated, skipping", provider_sub.id);
        return Ok(());
    };

    subscription.refresh_period(provider_sub.period_start(), provider_sub.period_end());
    subscription.cancel_at_period_end = provider_sub.cancel_at_period_end;
    subscription.auto_renew = !provider_sub.cancel_at_period_end;

    let mut account_status = None;
    if let Some(next) = SubscriptionStatus::from_provider(&provider_sub.status) {
        if next != subscription.status {
            match subscription.transition_to(next) {
                Ok(()) => {
                    account_status = Some(match next {
                        SubscriptionStatus::Active => AccountStatus::Active,
                        SubscriptionStatus::PastDue => AccountStatus::PastDue,
                        SubscriptionStatus::Cancelled => AccountStatus::Cancelled,
                        SubscriptionStatus::Expired => AccountStatus::Expired,
                    });
                }
                Err(e) => {
                    log::warn!("Dropping status update for {}: {}", provider_sub.id, e);
                }
            }
        }
    }

    db.update_subscription(&subscription).await?;

    if let Some(status) = account_status {
        if let Some(user) = db.get_user(&subscription.user_id).await? {
            set_user_status(db, user, status).await?;
        }
    }

    log::info!(
        "Updated subscription {} (period ends {})",
        provider_sub.id,
        subscription.current_period_end
    );
    Ok(())
}
