use std::{sync::Arc, time::Duration};

use rand::{rngs::OsRng, RngCore};
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::reset::repo::{ResetToken, ResetTokenStore};

/// 256 bits of entropy, hex encoded on the wire.
pub const TOKEN_BYTES: usize = 32;

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issues, validates and retires single-use password-reset grants.
#[derive(Clone)]
pub struct ResetLedger {
    store: Arc<dyn ResetTokenStore>,
    ttl: TimeDuration,
}

impl ResetLedger {
    pub fn new(store: Arc<dyn ResetTokenStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl: TimeDuration::seconds(ttl.as_secs() as i64),
        }
    }

    /// Returns the raw token. Any earlier token for the user stops being redeemable.
    pub async fn issue(&self, user_id: Uuid) -> AppResult<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc()).await
    }

    pub async fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> AppResult<String> {
        let token = generate_token();
        self.store
            .replace(ResetToken {
                user_id,
                token: token.clone(),
                expires_at: now + self.ttl,
                created_at: now,
            })
            .await?;
        info!(user_id = %user_id, "reset token issued");
        Ok(token)
    }

    /// Resolves a live token to its owner. The token stays in place; see [`ResetLedger::retire`].
    pub async fn redeem(&self, token: &str) -> AppResult<Uuid> {
        self.redeem_at(token, OffsetDateTime::now_utc()).await
    }

    pub async fn redeem_at(&self, token: &str, now: OffsetDateTime) -> AppResult<Uuid> {
        match self.store.find_live(token, now).await? {
            Some(entry) => {
                debug!(user_id = %entry.user_id, "reset token redeemed");
                Ok(entry.user_id)
            }
            None => {
                warn!("reset token unknown or expired");
                Err(AppError::InvalidOrExpiredToken)
            }
        }
    }

    /// Spends a live token on a password change. Only one caller can spend a given token;
    /// if the password write fails the token stays redeemable.
    pub async fn consume(&self, token: &str, password_hash: &str) -> AppResult<Uuid> {
        self.consume_at(token, password_hash, OffsetDateTime::now_utc())
            .await
    }

    pub async fn consume_at(
        &self,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Uuid> {
        match self.store.consume(token, now, password_hash).await? {
            Some(user_id) => {
                debug!(user_id = %user_id, "reset token consumed");
                Ok(user_id)
            }
            None => {
                warn!("reset token already spent, expired or orphaned");
                Err(AppError::InvalidOrExpiredToken)
            }
        }
    }

    /// Drops every outstanding grant of `user_id`.
    pub async fn retire(&self, user_id: Uuid) -> AppResult<()> {
        let removed = self.store.delete_for_user(user_id).await?;
        debug!(user_id = %user_id, removed, "reset tokens retired");
        Ok(())
    }

    pub async fn prune_expired(&self) -> AppResult<u64> {
        Ok(self.store.delete_expired(OffsetDateTime::now_utc()).await?)
    }
}

/// Periodically drops expired tokens. Lookups re-check expiry, so this only reclaims space.
pub fn spawn_sweeper(ledger: ResetLedger, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match ledger.prune_expired().await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "expired reset tokens pruned"),
                Err(e) => error!(error = ?e, "reset token sweep failed"),
            }
        }
    })
}
