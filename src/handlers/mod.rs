pub mod content;
pub mod health;
pub mod subscriptions;
pub mod users;
pub mod webhooks;
