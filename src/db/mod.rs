pub mod billing_event_log_repository;
pub mod entitlement_store;
#[cfg(test)]
pub mod mock_db;
pub mod postgres_billing_event_log_repository;
pub mod postgres_entitlement_store;
pub mod postgres_subscription_repository;
pub mod postgres_user_directory;
pub mod subscription_repository;
pub mod user_directory;
