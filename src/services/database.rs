use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;
use serde::Serialize;
use uuid::Uuid;
use anyhow::{anyhow, bail, Result};

use crate::models::{
    content::Content,
    payment::Payment,
    subscription::{Subscription, SubscriptionStatus},
    user::User,
};

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Db>,
}

impl DatabaseService {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = if database_url.starts_with("memory://") {
            Surreal::new::<Mem>(()).await?
        } else if let Some(path) = database_url.strip_prefix("file://") {
            Surreal::new::<RocksDb>(path).await?
        } else {
            return Err(anyhow!("Unsupported database URL: {}", database_url));
        };

        db.use_ns("studysphere").use_db("main").await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        // Unique indexes back the idempotency and correlation invariants:
        // duplicate inserts fail instead of relying on a preceding read.
        self.db
            .query(
                "
            DEFINE TABLE users SCHEMALESS;
            DEFINE INDEX unique_email ON users COLUMNS email UNIQUE;

            DEFINE TABLE subscriptions SCHEMALESS;
            DEFINE INDEX unique_stripe_subscription ON subscriptions COLUMNS stripe_subscription_id UNIQUE;
            DEFINE INDEX subscriptions_by_user ON subscriptions COLUMNS user_id, status;

            DEFINE TABLE payments SCHEMALESS;
            DEFINE INDEX unique_payment_intent ON payments COLUMNS stripe_payment_intent_id UNIQUE;
            DEFINE INDEX payments_by_user ON payments COLUMNS user_id;

            DEFINE TABLE contents SCHEMALESS;
        ",
            )
            .await?
            .check()?;

        log::info!("Database schema initialized");
        Ok(())
    }

    /// Serializes a record for storage, dropping the `id` field: the record
    /// key carries the identity, and readers restore it via `meta::id(id)`.
    fn to_row<T: Serialize>(record: &T) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(record)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("id");
        }
        Ok(value)
    }

    async fn insert<T: Serialize>(&self, table: &'static str, id: &Uuid, record: &T) -> Result<()> {
        let data = Self::to_row(record)?;
        self.db
            .query("CREATE type::thing($tb, $id) CONTENT $data")
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .bind(("data", data))
            .await?
            .check()?;
        Ok(())
    }

    async fn replace<T: Serialize>(&self, table: &'static str, id: &Uuid, record: &T) -> Result<()> {
        let data = Self::to_row(record)?;
        self.db
            .query("UPDATE type::thing($tb, $id) CONTENT $data")
            .bind(("tb", table))
            .bind(("id", id.to_string()))
            .bind(("data", data))
            .await?
            .check()?;
        Ok(())
    }

    // User operations

    pub async fn create_user(&self, user: &User) -> Result<()> {
        if self.get_user_by_email(&user.email).await?.is_some() {
            bail!("User with email {} already exists", user.email);
        }
        self.insert("users", &user.id, user).await
    }

    pub async fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT *, meta::id(id) AS id FROM type::thing('users', $id)")
            .bind(("id", user_id.to_string()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT *, meta::id(id) AS id FROM users WHERE email = $email")
            .bind(("email", email.to_lowercase()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn get_user_by_customer_ref(&self, customer_id: &str) -> Result<Option<User>> {
        let user: Option<User> = self
            .db
            .query("SELECT *, meta::id(id) AS id FROM users WHERE stripe_customer_id = $customer_id")
            .bind(("customer_id", customer_id.to_string()))
            .await?
            .take(0)?;
        Ok(user)
    }

    pub async fn update_user(&self, user: &User) -> Result<()> {
        self.replace("users", &user.id, user).await
    }

    // Subscription operations

    pub async fn create_subscription(&self, subscription: &Subscription) -> Result<()> {
        // At most one active subscription per account.
        if subscription.status == SubscriptionStatus::Active {
            if let Some(existing) = self
                .get_active_subscription_by_user(&subscription.user_id)
                .await?
            {
                bail!(
                    "User {} already has an active subscription ({})",
                    subscription.user_id,
                    existing.stripe_subscription_id
                );
            }
        }
        self.insert("subscriptions", &subscription.id, subscription)
            .await
    }

    pub async fn get_subscription(&self, subscription_id: &Uuid) -> Result<Option<Subscription>> {
        let subscription: Option<Subscription> = self
            .db
            .query("SELECT *, meta::id(id) AS id FROM type::thing('subscriptions', $id)")
            .bind(("id", subscription_id.to_string()))
            .await?
            .take(0)?;
        Ok(subscription)
    }

    pub async fn get_active_subscription_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<Subscription>> {
        let subscription: Option<Subscription> = self
            .db
            .query(
                "SELECT *, meta::id(id) AS id FROM subscriptions \
                 WHERE user_id = $user_id AND status = 'active' \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;
        Ok(subscription)
    }

    pub async fn get_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let subscription: Option<Subscription> = self
            .db
            .query(
                "SELECT *, meta::id(id) AS id FROM subscriptions \
                 WHERE stripe_subscription_id = $stripe_id",
            )
            .bind(("stripe_id", stripe_subscription_id.to_string()))
            .await?
            .take(0)?;
        Ok(subscription)
    }

    pub async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.replace("subscriptions", &subscription.id, subscription)
            .await
    }

    // Payment operations

    /// Inserts a ledger entry. The unique index on the payment-intent
    /// reference makes a duplicate insert fail, which the webhook reconciler
    /// treats as an already-processed delivery.
    pub async fn create_payment(&self, payment: &Payment) -> Result<()> {
        self.insert("payments", &payment.id, payment).await
    }

    pub async fn get_payment_by_intent_ref(&self, payment_intent_id: &str) -> Result<Option<Payment>> {
        let payment: Option<Payment> = self
            .db
            .query(
                "SELECT *, meta::id(id) AS id FROM payments \
                 WHERE stripe_payment_intent_id = $intent_id",
            )
            .bind(("intent_id", payment_intent_id.to_string()))
            .await?
            .take(0)?;
        Ok(payment)
    }

    pub async fn get_recent_payments_by_user(
        &self,
        user_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self
            .db
            .query(
                "SELECT *, meta::id(id) AS id FROM payments \
                 WHERE user_id = $user_id ORDER BY created_at DESC LIMIT $limit",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await?
            .take(0)?;
        Ok(payments)
    }

    // Content operations

    pub async fn create_content(&self, content: &Content) -> Result<()> {
        self.insert("contents", &content.id, content).await
    }

    pub async fn get_content(&self, content_id: &Uuid) -> Result<Option<Content>> {
        let content: Option<Content> = self
            .db
            .query("SELECT *, meta::id(id) AS id FROM type::thing('contents', $id)")
            .bind(("id", content_id.to_string()))
            .await?
            .take(0)?;
        Ok(content)
    }

    pub async fn list_published_contents(&self, include_premium: bool) -> Result<Vec<Content>> {
        let query = if include_premium {
            "SELECT *, meta::id(id) AS id FROM contents \
             WHERE is_published = true ORDER BY position ASC"
        } else {
            "SELECT *, meta::id(id) AS id FROM contents \
             WHERE is_published = true AND access_level = 'free' ORDER BY position ASC"
        };
        let contents: Vec<Content> = self.db.query(query).await?.take(0)?;
        Ok(contents)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::{AccessLevel, PlanType};
    use crate::models::user::AccountStatus;
    use chrono::{Duration, Utc};

    async fn memory_db() -> DatabaseService {
        DatabaseService::new("memory://").await.unwrap()
    }

    fn sample_subscription(user_id: Uuid, stripe_id: &str) -> Subscription {
        let now = Utc::now();
        Subscription::new(
            user_id,
            PlanType::Monthly,
            stripe_id.to_string(),
            "price_monthly".to_string(),
            now,
            now,
            now + Duration::days(30),
        )
    }

    fn sample_payment(user_id: Uuid, intent: &str) -> Payment {
        Payment::succeeded(
            user_id,
            None,
            intent.to_string(),
            Some("in_1".to_string()),
            999,
            "usd".to_string(),
            None,
            Some(Utc::now()),
        )
    }

    #[tokio::test]
    async fn test_user_round_trip() {
        let db = memory_db().await;

        let user = User::new("John Doe".to_string(), "john@example.com".to_string());
        db.create_user(&user).await.unwrap();

        let fetched = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.email, "john@example.com");
        assert_eq!(fetched.subscription_status, AccountStatus::Free);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = memory_db().await;

        let user = User::new("John".to_string(), "john@example.com".to_string());
        db.create_user(&user).await.unwrap();

        let dup = User::new("Johnny".to_string(), "JOHN@example.com".to_string());
        assert!(db.create_user(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_lookup_user_by_customer_ref() {
        let db = memory_db().await;

        let mut user = User::new("Jane".to_string(), "jane@example.com".to_string());
        user.set_stripe_customer_id("cus_42".to_string());
        db.create_user(&user).await.unwrap();

        let found = db.get_user_by_customer_ref("cus_42").await.unwrap();
        assert_eq!(found.unwrap().id, user.id);

        let missing = db.get_user_by_customer_ref("cus_none").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_single_active_subscription_per_user() {
        let db = memory_db().await;
        let user_id = Uuid::new_v4();

        db.create_subscription(&sample_subscription(user_id, "sub_1"))
            .await
            .unwrap();

        let second = sample_subscription(user_id, "sub_2");
        assert!(db.create_subscription(&second).await.is_err());

        // A cancelled record does not block a new active one.
        let mut first = db
            .get_active_subscription_by_user(&user_id)
            .await
            .unwrap()
            .unwrap();
        first.mark_cancelled(Utc::now()).unwrap();
        db.update_subscription(&first).await.unwrap();

        db.create_subscription(&sample_subscription(user_id, "sub_3"))
            .await
            .unwrap();
        let active = db
            .get_active_subscription_by_user(&user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.stripe_subscription_id, "sub_3");
    }

    #[tokio::test]
    async fn test_subscription_lookup_by_stripe_id() {
        let db = memory_db().await;
        let sub = sample_subscription(Uuid::new_v4(), "sub_ext");
        db.create_subscription(&sub).await.unwrap();

        let found = db.get_subscription_by_stripe_id("sub_ext").await.unwrap();
        assert_eq!(found.unwrap().id, sub.id);
    }

    #[tokio::test]
    async fn test_duplicate_payment_intent_rejected() {
        let db = memory_db().await;
        let user_id = Uuid::new_v4();

        db.create_payment(&sample_payment(user_id, "pi_1"))
            .await
            .unwrap();

        // Same intent reference, fresh record id: the unique index refuses it.
        assert!(db
            .create_payment(&sample_payment(user_id, "pi_1"))
            .await
            .is_err());

        let found = db.get_payment_by_intent_ref("pi_1").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_recent_payments_newest_first_and_limited() {
        let db = memory_db().await;
        let user_id = Uuid::new_v4();

        for i in 0..5 {
            let mut payment = sample_payment(user_id, &format!("pi_{}", i));
            payment.created_at = Utc::now() + Duration::seconds(i);
            db.create_payment(&payment).await.unwrap();
        }

        let recent = db.get_recent_payments_by_user(&user_id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].stripe_payment_intent_id, "pi_4");
        assert_eq!(recent[2].stripe_payment_intent_id, "pi_2");
    }

    #[tokio::test]
    async fn test_content_premium_filter() {
        let db = memory_db().await;

        db.create_content(&Content::new(
            "Intro".to_string(),
            "body".to_string(),
            AccessLevel::Free,
            1,
        ))
        .await
        .unwrap();
        db.create_content(&Content::new(
            "Deep dive".to_string(),
            "body".to_string(),
            AccessLevel::Premium,
            2,
        ))
        .await
        .unwrap();

        let all = db.list_published_contents(true).await.unwrap();
        assert_eq!(all.len(), 2);

        let free_only = db.list_published_contents(false).await.unwrap();
        assert_eq!(free_only.len(), 1);
        assert_eq!(free_only[0].title, "Intro");
    }
}
