use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeConfig;
use crate::models::common::PlanType;
use crate::models::webhook::SubscriptionObject;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: String,
}

/// Thin client over the payment provider's REST API. Constructed once at
/// startup from explicit configuration and shared via app data.
#[derive(Clone)]
pub struct StripeService {
    client: Client,
    config: StripeConfig,
}

impl StripeService {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn post_form(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.config.api_base, path))
            .bearer_auth(&self.config.secret_key)
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Stripe {} failed ({}): {}", path, status, error_text));
        }

        Ok(response.json().await?)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}{}", self.config.api_base, path))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Stripe {} failed ({}): {}", path, status, error_text));
        }

        Ok(response.json().await?)
    }

    /// Creates a provider-side customer carrying the account id as
    /// correlation metadata. Called once per account; the returned reference
    /// is persisted and reused by later checkouts.
    pub async fn create_customer(&self, email: &str, name: &str, user_id: &Uuid) -> Result<String> {
        let params = [
            ("email", email.to_string()),
            ("name", name.to_string()),
            ("metadata[userId]", user_id.to_string()),
        ];

        log::info!("Creating Stripe customer for user {}", user_id);
        let customer = self.post_form("/v1/customers", &params).await?;

        customer["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("No id in customer response"))
    }

    /// Creates a hosted checkout session in subscription mode. The account id
    /// and plan key ride along as session metadata so the webhook reconciler
    /// can recover which plan was purchased.
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: &Uuid,
        plan: PlanType,
    ) -> Result<CheckoutSession> {
        let price_id = self.config.plans.get(plan).price_id.clone();
        let params = [
            ("customer", customer_id.to_string()),
            ("mode", "subscription".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
            ("metadata[userId]", user_id.to_string()),
            ("metadata[planType]", plan.as_str().to_string()),
        ];

        log::info!(
            "Creating checkout session for customer {} plan {}",
            customer_id,
            plan
        );
        let session = self.post_form("/v1/checkout/sessions", &params).await?;

        let session_id = session["id"]
            .as_str()
            .ok_or_else(|| anyhow!("No id in checkout session response"))?;
        let url = session["url"]
            .as_str()
            .ok_or_else(|| anyhow!("No url in checkout session response"))?;

        Ok(CheckoutSession {
            session_id: session_id.to_string(),
            url: url.to_string(),
        })
    }

    /// Fetches the full subscription object; checkout sessions alone do not
    /// carry the billing-period fields.
    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionObject> {
        let raw = self
            .get_json(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Flags the provider-side subscription to cancel at period end. The
    /// local record keeps status active until the deletion event arrives.
    pub async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()> {
        let params = [("cancel_at_period_end", "true".to_string())];
        self.post_form(&format!("/v1/subscriptions/{}", subscription_id), &params)
            .await?;
        Ok(())
    }

    /// Validates the `Stripe-Signature` header (`t=<ts>,v1=<hex>`) against
    /// the raw, unparsed payload bytes. Must run before any parsing.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature_header: &str) -> bool {
        verify_signature(payload, signature_header, &self.config.webhook_secret)
    }
}

pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &str) -> bool {
    let mut timestamp = None;
    let mut signature = None;
    for part in signature_header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(v)) => (t, v),
        _ => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    // Signed payload is "<timestamp>.<raw body>"; updating in parts keeps the
    // computation on the raw bytes.
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let expected = hex::encode(mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlanConfig, PlanTable};

    fn test_config() -> StripeConfig {
        StripeConfig {
            api_base: "https://api.stripe.test".to_string(),
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test_secret".to_string(),
            success_url: "https://example.com/success".to_string(),
            cancel_url: "https://example.com/cancel".to_string(),
            plans: PlanTable {
                monthly: PlanConfig {
                    price_id: "price_monthly".to_string(),
                    name: "Monthly Premium".to_string(),
                    amount: 999,
                },
                yearly: PlanConfig {
                    price_id: "price_yearly".to_string(),
                    name: "Yearly Premium".to_string(),
                    amount: 9999,
                },
            },
        }
    }

    fn sign(payload: &[u8], timestamp: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let service = StripeService::new(test_config());
        let payload = br#"{"type":"invoice.payment_succeeded"}"#;
        let sig = sign(payload, "1700000000", "whsec_test_secret");
        let header = format!("t=1700000000,v1={}", sig);

        assert!(service.verify_webhook_signature(payload, &header));
    }

    #[test]
    fn test_payload_tamper_rejected() {
        let service = StripeService::new(test_config());
        let payload = br#"{"type":"invoice.payment_succeeded"}"#;
        let sig = sign(payload, "1700000000", "whsec_test_secret");
        let header = format!("t=1700000000,v1={}", sig);

        let mut tampered = payload.to_vec();
        tampered[0] ^= 0x01;
        assert!(!service.verify_webhook_signature(&tampered, &header));
    }

    #[test]
    fn test_header_tamper_rejected() {
        let service = StripeService::new(test_config());
        let payload = br#"{"type":"invoice.payment_succeeded"}"#;
        let sig = sign(payload, "1700000000", "whsec_test_secret");

        // Flipped timestamp invalidates the signed payload.
        let header = format!("t=1700000001,v1={}", sig);
        assert!(!service.verify_webhook_signature(payload, &header));

        let mut bad_sig = sig.into_bytes();
        bad_sig[0] = if bad_sig[0] == b'a' { b'b' } else { b'a' };
        let header = format!("t=1700000000,v1={}", String::from_utf8(bad_sig).unwrap());
        assert!(!service.verify_webhook_signature(payload, &header));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let service = StripeService::new(test_config());
        assert!(!service.verify_webhook_signature(b"payload", ""));
        assert!(!service.verify_webhook_signature(b"payload", "t=123"));
        assert!(!service.verify_webhook_signature(b"payload", "v1=abc"));
        assert!(!service.verify_webhook_signature(b"payload", "garbage"));
    }
}
