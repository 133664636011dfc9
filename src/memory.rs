//! In-process stores and notifier for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::IdentityStore;
use crate::auth::repo_types::{Credentials, Identity, NewIdentity, ProfileChanges};
use crate::db::StoreError;
use crate::notify::Notifier;
use crate::reset::repo::{ResetToken, ResetTokenStore};

/// Each map sits behind one lock, so uniqueness checks and writes are atomic.
/// Lock order is `tokens` before `users`.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, Credentials>>,
    tokens: Mutex<HashMap<Uuid, ResetToken>>,
    broken_password_writes: AtomicBool,
    broken_token_writes: AtomicBool,
}

fn outage() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    /// Makes every password-hash write fail as if the database were down.
    pub fn break_password_writes(&self) {
        self.broken_password_writes.store(true, Ordering::SeqCst);
    }

    pub fn break_token_writes(&self) {
        self.broken_token_writes.store(true, Ordering::SeqCst);
    }

    pub fn reset_tokens_for(&self, user_id: Uuid) -> usize {
        let tokens = self.tokens.lock().unwrap();
        tokens.values().filter(|t| t.user_id == user_id).count()
    }

    pub fn reset_token_count(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|c| c.identity.email == new.email) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let identity = Identity {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            role: new.role,
            company: new.company,
            location: None,
            bio: None,
            skills: Vec::new(),
            experience: None,
            education: None,
            resume: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(
            identity.id,
            Credentials {
                identity: identity.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(identity)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.find_credentials_by_id(id).await?.map(|c| c.identity))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .find_credentials_by_email(email)
            .await?
            .map(|c| c.identity))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|c| c.identity.email == email).cloned())
    }

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<Identity>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(creds) = users.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(&mut creds.identity);
        creds.identity.updated_at = OffsetDateTime::now_utc();
        Ok(Some(creds.identity.clone()))
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool, StoreError> {
        if self.broken_password_writes.load(Ordering::SeqCst) {
            return Err(outage());
        }
        let mut users = self.users.lock().unwrap();
        let Some(creds) = users.get_mut(&id) else {
            return Ok(false);
        };
        creds.password_hash = password_hash.to_string();
        creds.identity.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn replace(&self, entry: ResetToken) -> Result<(), StoreError> {
        if self.broken_token_writes.load(Ordering::SeqCst) {
            return Err(outage());
        }
        let mut tokens = self.tokens.lock().unwrap();
        if tokens
            .values()
            .any(|t| t.token == entry.token && t.user_id != entry.user_id)
        {
            return Err(StoreError::Conflict);
        }
        tokens.insert(entry.user_id, entry);
        Ok(())
    }

    async fn find_live(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<ResetToken>, StoreError> {
        let tokens = self.tokens.lock().unwrap();
        Ok(tokens
            .values()
            .find(|t| t.token == token && t.expires_at > now)
            .cloned())
    }

    async fn consume(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        let Some(user_id) = tokens
            .values()
            .find(|t| t.token == token && t.expires_at > now)
            .map(|t| t.user_id)
        else {
            return Ok(None);
        };

        let mut users = self.users.lock().unwrap();
        let Some(creds) = users.get_mut(&user_id) else {
            return Ok(None);
        };
        if self.broken_password_writes.load(Ordering::SeqCst) {
            return Err(outage());
        }
        creds.password_hash = password_hash.to_string();
        creds.identity.updated_at = now;
        tokens.remove(&user_id);
        Ok(Some(user_id))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        Ok(tokens.remove(&user_id).map_or(0, |_| 1))
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}

/// Captures outgoing notifications; optionally fails every send.
#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    welcomes: Mutex<Vec<(String, String)>>,
    resets: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Waits until `n` welcome messages were recorded.
    pub async fn wait_for_welcomes(&self, n: usize) -> Vec<(String, String)> {
        wait_for(&self.welcomes, n).await
    }

    /// `(email, token)` pairs of password-reset messages, once `n` have arrived.
    pub async fn wait_for_resets(&self, n: usize) -> Vec<(String, String)> {
        wait_for(&self.resets, n).await
    }
}

async fn wait_for(log: &Mutex<Vec<(String, String)>>, n: usize) -> Vec<(String, String)> {
    for _ in 0..200 {
        {
            let entries = log.lock().unwrap();
            if entries.len() >= n {
                return entries.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} notifications");
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_welcome(&self, email: &str, name: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        self.welcomes
            .lock()
            .unwrap()
            .push((email.to_string(), name.to_string()));
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        token: &str,
        _name: &str,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        self.resets
            .lock()
            .unwrap()
            .push((email.to_string(), token.to_string()));
        Ok(())
    }
}
