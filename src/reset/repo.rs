use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::StoreError;

/// One outstanding password-reset grant.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ResetToken {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Persistence for reset tokens.
///
/// `replace` must leave exactly one row per user even under concurrent callers, and
/// `consume` must let at most one caller spend a given token.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Drops any tokens held by `entry.user_id` and stores `entry` in their place.
    async fn replace(&self, entry: ResetToken) -> Result<(), StoreError>;

    /// Exact token match whose expiry is strictly after `now`.
    async fn find_live(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ResetToken>, StoreError>;

    /// Deletes the live `token` and stores `password_hash` on its owner as one unit.
    ///
    /// Returns the owner, or `None` when the token is not live or its owner is gone. On `None`
    /// or an error nothing is changed.
    async fn consume(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError>;

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgResetTokenStore {
    db: PgPool,
}

impl PgResetTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResetTokenStore for PgResetTokenStore {
    async fn replace(&self, entry: ResetToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET token = EXCLUDED.token,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.token)
        .bind(entry.expires_at)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_live(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ResetToken>, StoreError> {
        let row = sqlx::query_as::<_, ResetToken>(
            r#"
            SELECT user_id, token, expires_at, created_at
            FROM password_reset_tokens
            WHERE token = $1 AND expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn consume(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tx = self.db.begin().await?;

        // The row lock makes a concurrent consumer wait here and then find nothing.
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM password_reset_tokens
            WHERE token = $1 AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let updated = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(user_id))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
