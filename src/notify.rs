//! Outbound account notifications.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, email: &str, name: &str) -> anyhow::Result<()>;

    async fn send_password_reset(&self, email: &str, token: &str, name: &str)
        -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of a mail server.
pub struct LogNotifier {
    frontend_url: String,
}

impl LogNotifier {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into(),
        }
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/reset-password?token={}",
            self.frontend_url.trim_end_matches('/'),
            token
        )
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_welcome(&self, email: &str, name: &str) -> anyhow::Result<()> {
        info!("welcome notification queued");
        debug!(%email, %name, "welcome to Job Portal");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        token: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        info!("password reset notification queued");
        debug!(%email, %name, link = %self.reset_link(token), "password reset requested");
        Ok(())
    }
}

/// Sends without waiting. Failures are logged and go no further.
pub fn send_welcome(notifier: &Arc<dyn Notifier>, email: String, name: String) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.send_welcome(&email, &name).await {
            error!(error = %e, "welcome notification failed");
        }
    });
}

pub fn send_password_reset(notifier: &Arc<dyn Notifier>, email: String, token: String, name: String) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.send_password_reset(&email, &token, &name).await {
            error!(error = %e, "password reset notification failed");
        }
    });
}
