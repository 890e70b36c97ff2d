use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::user_directory::UserDirectory;

pub struct PostgresUserDirectory {
    pub pool: PgPool,
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE lower(email) = lower($1)")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
    }
}
