use reqwest::Client;
use serde_json::json;

use crate::config::AppConfig;

/// Transactional email sender. Delivery goes through a configured HTTP relay
/// endpoint; when none is configured the messages are logged instead, which
/// keeps local development and tests free of mail setup.
///
/// Email is best-effort: a delivery failure never fails the request that
/// triggered it.
#[derive(Clone)]
pub struct EmailService {
    client: Client,
    endpoint: Option<String>,
    from: String,
}

impl EmailService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.mail_endpoint.clone(),
            from: config.mail_from.clone(),
        }
    }

    async fn send(&self, to: &str, subject: &str, body: String) {
        let Some(endpoint) = &self.endpoint else {
            log::info!("Mail (no relay configured) to {}: {}", to, subject);
            return;
        };

        let payload = json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": body,
        });

        match self.client.post(endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                log::info!("Sent '{}' to {}", subject, to);
            }
            Ok(response) => {
                log::warn!(
                    "Mail relay returned {} for '{}' to {}",
                    response.status(),
                    subject,
                    to
                );
            }
            Err(e) => {
                log::warn!("Failed to send '{}' to {}: {}", subject, to, e);
            }
        }
    }

    pub async fn send_welcome(&self, to: &str, name: &str, trial_days: i64) {
        self.send(
            to,
            "Welcome to StudySphere!",
            format!(
                "Hi {},\n\nYour {}-day free trial has started. Explore the full \
                 course library while it lasts.\n\nThe StudySphere Team",
                name, trial_days
            ),
        )
        .await;
    }

    pub async fn send_subscription_confirmed(&self, to: &str, name: &str, plan_name: &str) {
        self.send(
            to,
            "Your subscription is active",
            format!(
                "Hi {},\n\nThanks for subscribing to the {} plan. You now have \
                 full access to all premium content.\n\nThe StudySphere Team",
                name, plan_name
            ),
        )
        .await;
    }

    pub async fn send_payment_failed(&self, to: &str, name: &str) {
        self.send(
            to,
            "Payment failed",
            format!(
                "Hi {},\n\nWe couldn't process your latest payment. Please update \
                 your payment method to keep your premium access.\n\nThe StudySphere Team",
                name
            ),
        )
        .await;
    }

    pub async fn send_subscription_cancelled(&self, to: &str, name: &str) {
        self.send(
            to,
            "Subscription cancelled",
            format!(
                "Hi {},\n\nYour subscription has ended. You can resubscribe at any \
                 time to regain premium access.\n\nThe StudySphere Team",
                name
            ),
        )
        .await;
    }
}
