use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::common::PlanType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    PastDue,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled | SubscriptionStatus::Expired)
    }

    /// Allowed transitions: active -> {past_due, cancelled, expired},
    /// past_due -> {active, cancelled}. Terminal states admit nothing.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        match self {
            SubscriptionStatus::Active => matches!(
                next,
                SubscriptionStatus::PastDue
                    | SubscriptionStatus::Cancelled
                    | SubscriptionStatus::Expired
            ),
            SubscriptionStatus::PastDue => matches!(
                next,
                SubscriptionStatus::Active | SubscriptionStatus::Cancelled
            ),
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => false,
        }
    }

    /// Maps the provider's subscription status string. Unknown values return
    /// None so the caller keeps the current status.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "active" | "trialing" => Some(SubscriptionStatus::Active),
            "canceled" | "cancelled" => Some(SubscriptionStatus::Cancelled),
            "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
            "incomplete_expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub status: SubscriptionStatus,
    pub stripe_subscription_id: String,
    pub stripe_price_id: String,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub auto_renew: bool,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        user_id: Uuid,
        plan_type: PlanType,
        stripe_subscription_id: String,
        stripe_price_id: String,
        start_date: DateTime<Utc>,
        current_period_start: DateTime<Utc>,
        current_period_end: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            plan_type,
            status: SubscriptionStatus::Active,
            stripe_subscription_id,
            stripe_price_id,
            start_date,
            // Invariant: expiry_date tracks current_period_end while active.
            expiry_date: current_period_end,
            current_period_start,
            current_period_end,
            auto_renew: true,
            cancel_at_period_end: false,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expiry_date > now
    }

    pub fn transition_to(&mut self, next: SubscriptionStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "Cannot transition subscription from {:?} to {:?}",
                self.status, next
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Deferred cancellation keeps the subscription active until period end;
    /// the terminal transition arrives later via the provider's
    /// subscription-deleted event.
    pub fn cancel(&mut self, immediately: bool) {
        let now = Utc::now();
        if immediately {
            self.status = SubscriptionStatus::Cancelled;
            self.cancelled_at = Some(now);
            self.expiry_date = now;
        } else {
            self.cancel_at_period_end = true;
            self.auto_renew = false;
        }
        self.updated_at = now;
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        self.transition_to(SubscriptionStatus::Cancelled)?;
        self.cancelled_at = Some(now);
        Ok(())
    }

    pub fn refresh_period(
        &mut self,
        current_period_start: DateTime<Utc>,
        current_period_end: DateTime<Utc>,
    ) {
        self.current_period_start = current_period_start;
        self.current_period_end = current_period_end;
        self.expiry_date = current_period_end;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_subscription() -> Subscription {
        let now = Utc::now();
        Subscription::new(
            Uuid::new_v4(),
            PlanType::Monthly,
            "sub_123".to_string(),
            "price_123".to_string(),
            now,
            now,
            now + Duration::days(30),
        )
    }

    #[test]
    fn test_new_subscription_is_active_with_expiry_at_period_end() {
        let sub = sample_subscription();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expiry_date, sub.current_period_end);
        assert!(sub.is_active(Utc::now()));
    }

    #[test]
    fn test_deferred_cancel_keeps_status_active() {
        let mut sub = sample_subscription();
        sub.cancel(false);

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.cancel_at_period_end);
        assert!(!sub.auto_renew);
        assert!(sub.cancelled_at.is_none());
    }

    #[test]
    fn test_immediate_cancel_is_terminal() {
        let mut sub = sample_subscription();
        sub.cancel(true);

        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(sub.cancelled_at.is_some());
        assert!(!sub.is_active(Utc::now()));
    }

    #[test]
    fn test_transition_graph() {
        let mut sub = sample_subscription();
        assert!(sub.transition_to(SubscriptionStatus::PastDue).is_ok());
        assert!(sub.transition_to(SubscriptionStatus::Active).is_ok());
        assert!(sub.transition_to(SubscriptionStatus::Expired).is_ok());

        // Terminal: no way back.
        assert!(sub.transition_to(SubscriptionStatus::Active).is_err());
        assert!(sub.transition_to(SubscriptionStatus::PastDue).is_err());
    }

    #[test]
    fn test_mark_cancelled_on_cancelled_subscription_fails() {
        let mut sub = sample_subscription();
        assert!(sub.mark_cancelled(Utc::now()).is_ok());
        assert!(sub.cancelled_at.is_some());
        assert!(sub.mark_cancelled(Utc::now()).is_err());
    }

    #[test]
    fn test_refresh_period_moves_expiry() {
        let mut sub = sample_subscription();
        let new_start = Utc::now() + Duration::days(30);
        let new_end = Utc::now() + Duration::days(60);
        sub.refresh_period(new_start, new_end);

        assert_eq!(sub.current_period_start, new_start);
        assert_eq!(sub.current_period_end, new_end);
        assert_eq!(sub.expiry_date, new_end);
    }

    #[test]
    fn test_from_provider_status() {
        assert_eq!(
            SubscriptionStatus::from_provider("active"),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            SubscriptionStatus::from_provider("canceled"),
            Some(SubscriptionStatus::Cancelled)
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            Some(SubscriptionStatus::PastDue)
        );
        assert_eq!(SubscriptionStatus::from_provider("paused"), None);
    }
}
