pub mod jwt;
pub mod usage_limits;
pub mod webhook_signature;
