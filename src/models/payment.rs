use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Cancelled,
}

/// One entry in the append-style payment ledger. The provider's
/// payment-intent reference is globally unique and doubles as the
/// idempotency key for webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub stripe_payment_intent_id: String,
    pub stripe_invoice_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub receipt_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn succeeded(
        user_id: Uuid,
        subscription_id: Option<Uuid>,
        stripe_payment_intent_id: String,
        stripe_invoice_id: Option<String>,
        amount: i64,
        currency: String,
        receipt_url: Option<String>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            subscription_id,
            stripe_payment_intent_id,
            stripe_invoice_id,
            amount,
            currency: currency.to_uppercase(),
            status: PaymentStatus::Succeeded,
            receipt_url,
            paid_at,
            created_at: now,
            updated_at: now,
        }
    }
}
