pub mod billing;
pub mod billing_webhook;
pub mod entity;
pub mod user;
