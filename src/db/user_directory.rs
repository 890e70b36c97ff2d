use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Case-insensitive email match.
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, sqlx::Error>;
}
