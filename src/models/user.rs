use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::models::common::UserRole;

/// The account's cached view of entitlement. Kept consistent with the latest
/// Subscription record by the webhook reconciler; it is a denormalized
/// projection, not a source of truth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Free,
    Trial,
    Active,
    Expired,
    Cancelled,
    PastDue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub subscription_status: AccountStatus,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

impl User {
    pub fn new(name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email: email.to_lowercase(),
            password_hash: None,
            role: UserRole::User,
            subscription_status: AccountStatus::Free,
            trial_start_date: None,
            trial_end_date: None,
            stripe_customer_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_trial(&mut self, trial_days: i64, now: DateTime<Utc>) {
        self.subscription_status = AccountStatus::Trial;
        self.trial_start_date = Some(now);
        self.trial_end_date = Some(now + Duration::days(trial_days));
        self.updated_at = now;
    }

    /// Entitlement evaluator: whether this account may access premium content
    /// at `now`. Pure, no I/O. The time check dominates a stale `trial`
    /// status: a lapsed trial is not entitled even before the status field
    /// has been lazily downgraded.
    pub fn has_premium_access(&self, now: DateTime<Utc>) -> bool {
        match self.subscription_status {
            AccountStatus::Active => true,
            AccountStatus::Trial => self.trial_end_date.map_or(false, |end| now < end),
            _ => false,
        }
    }

    /// Lazy downgrade of a lapsed trial, applied on read paths. Returns true
    /// if the cached status changed and should be persisted.
    pub fn refresh_trial_status(&mut self, now: DateTime<Utc>) -> bool {
        if self.subscription_status == AccountStatus::Trial
            && self.trial_end_date.map_or(false, |end| now >= end)
        {
            self.subscription_status = AccountStatus::Expired;
            self.updated_at = now;
            return true;
        }
        false
    }

    pub fn set_subscription_status(&mut self, status: AccountStatus) {
        self.subscription_status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_stripe_customer_id(&mut self, customer_id: String) {
        self.stripe_customer_id = Some(customer_id);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_creation() {
        let user = User::new("John Doe".to_string(), "JOHN@Example.com".to_string());
        assert_eq!(user.email, "john@example.com");
        assert_eq!(user.subscription_status, AccountStatus::Free);
        assert_eq!(user.role, UserRole::User);
        assert!(user.stripe_customer_id.is_none());
    }

    #[test]
    fn test_trial_grants_access_until_end() {
        let mut user = User::new("Jane".to_string(), "jane@example.com".to_string());
        let now = Utc::now();
        user.start_trial(14, now);

        assert_eq!(user.subscription_status, AccountStatus::Trial);
        assert!(user.has_premium_access(now));
        assert!(user.has_premium_access(now + Duration::days(13)));
        assert!(!user.has_premium_access(now + Duration::days(14)));
        assert!(!user.has_premium_access(now + Duration::days(30)));
    }

    #[test]
    fn test_lapsed_trial_denied_before_downgrade() {
        // Status still reads `trial` but the window has passed: the time
        // check must dominate the cached status.
        let mut user = User::new("Jane".to_string(), "jane@example.com".to_string());
        let start = Utc::now() - Duration::days(20);
        user.start_trial(14, start);

        assert_eq!(user.subscription_status, AccountStatus::Trial);
        assert!(!user.has_premium_access(Utc::now()));
    }

    #[test]
    fn test_refresh_trial_status_downgrades() {
        let mut user = User::new("Jane".to_string(), "jane@example.com".to_string());
        let start = Utc::now() - Duration::days(20);
        user.start_trial(14, start);

        assert!(user.refresh_trial_status(Utc::now()));
        assert_eq!(user.subscription_status, AccountStatus::Expired);

        // Second call is a no-op.
        assert!(!user.refresh_trial_status(Utc::now()));
    }

    #[test]
    fn test_active_status_grants_access() {
        let mut user = User::new("Jane".to_string(), "jane@example.com".to_string());
        user.set_subscription_status(AccountStatus::Active);
        assert!(user.has_premium_access(Utc::now()));

        user.set_subscription_status(AccountStatus::PastDue);
        assert!(!user.has_premium_access(Utc::now()));
    }
}
