pub mod common;
pub mod content;
pub mod payment;
pub mod subscription;
pub mod user;
pub mod webhook;
