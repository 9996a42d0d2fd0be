use serde::{Deserialize, Serialize};
use std::env;

use crate::models::common::PlanType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub stripe: StripeConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    pub plans: PlanTable,
}

/// The configured plan catalog. Built once at startup and handed to the
/// services that need it; there is no ambient plan table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTable {
    pub monthly: PlanConfig,
    pub yearly: PlanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub price_id: String,
    pub name: String,
    pub amount: i64,
}

impl PlanTable {
    pub fn get(&self, plan: PlanType) -> &PlanConfig {
        match plan {
            PlanType::Monthly => &self.monthly,
            PlanType::Yearly => &self.yearly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub trial_period_days: i64,
    pub frontend_url: String,
    pub mail_endpoint: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "file://studysphere.db".to_string()),

            stripe: StripeConfig {
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                secret_key: env::var("STRIPE_SECRET_KEY")?,
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")?,
                success_url: env::var("STRIPE_SUCCESS_URL").unwrap_or_else(|_| {
                    format!(
                        "{}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}",
                        frontend_url()
                    )
                }),
                cancel_url: env::var("STRIPE_CANCEL_URL")
                    .unwrap_or_else(|_| format!("{}/subscription/cancel", frontend_url())),
                plans: PlanTable {
                    monthly: PlanConfig {
                        price_id: env::var("STRIPE_PRICE_ID_MONTHLY")?,
                        name: "Monthly Premium".to_string(),
                        amount: 999,
                    },
                    yearly: PlanConfig {
                        price_id: env::var("STRIPE_PRICE_ID_YEARLY")?,
                        name: "Yearly Premium".to_string(),
                        amount: 9999,
                    },
                },
            },

            app: AppConfig {
                trial_period_days: env::var("TRIAL_PERIOD_DAYS")
                    .unwrap_or_else(|_| "14".to_string())
                    .parse()
                    .unwrap_or(14),
                frontend_url: frontend_url(),
                mail_endpoint: env::var("MAIL_ENDPOINT").ok(),
                mail_from: env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@studysphere.app".to_string()),
            },
        })
    }
}

fn frontend_url() -> String {
    env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            trial_period_days: 14,
            frontend_url: "http://localhost:5173".to_string(),
            mail_endpoint: None,
            mail_from: "no-reply@studysphere.app".to_string(),
        }
    }
}
