use serde::Deserialize;
use chrono::{DateTime, Utc};

/// Stripe event envelope. Only the fields the reconciler reads are modelled;
/// the object payload stays untyped until the event kind is known.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

/// The business metadata attached by the checkout initiator; the provider's
/// own objects do not carry the plan concept.
#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "planType")]
    pub plan_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub hosted_invoice_url: Option<String>,
    pub status_transitions: Option<StatusTransitions>,
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StatusTransitions {
    pub paid_at: Option<i64>,
}

impl InvoiceObject {
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.status_transitions
            .as_ref()
            .and_then(|t| t.paid_at)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    pub start_date: Option<i64>,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItems {
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    pub price: PriceObject,
}

#[derive(Debug, Deserialize)]
pub struct PriceObject {
    pub id: String,
}

impl SubscriptionObject {
    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| self.period_start())
    }

    pub fn period_start(&self) -> DateTime<Utc> {
        datetime_from_epoch(self.current_period_start)
    }

    pub fn period_end(&self) -> DateTime<Utc> {
        datetime_from_epoch(self.current_period_end)
    }

    pub fn price_id(&self) -> Option<&str> {
        self.items
            .as_ref()
            .and_then(|items| items.data.first())
            .map(|item| item.price.id.as_str())
    }
}

pub fn datetime_from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
