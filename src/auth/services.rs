use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::{ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest};
use crate::auth::jwt::JwtKeys;
use crate::auth::password;
use crate::auth::repo::IdentityStore;
use crate::auth::repo_types::{Identity, NewIdentity};
use crate::auth::validate;
use crate::db::StoreError;
use crate::error::{AppError, AppResult, FieldError};
use crate::notify::{self, Notifier};

/// Owns identity records and password verification.
#[derive(Clone)]
pub struct CredentialService {
    identities: Arc<dyn IdentityStore>,
    keys: JwtKeys,
    notifier: Arc<dyn Notifier>,
}

impl CredentialService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        keys: JwtKeys,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            identities,
            keys,
            notifier,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Creates an identity and signs a session token for it.
    pub async fn register(&self, req: RegisterRequest) -> AppResult<(Identity, String)> {
        let reg = validate::registration(req)?;
        let password_hash = password::hash_password_async(reg.password)
            .await
            .map_err(AppError::internal)?;

        let identity = self
            .identities
            .create(NewIdentity {
                name: reg.name,
                email: reg.email,
                password_hash,
                role: reg.role,
                company: reg.company,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict => {
                    warn!("registration rejected, email already registered");
                    AppError::DuplicateEmail
                }
                other => other.into(),
            })?;

        let token = self.keys.sign(identity.id).map_err(AppError::internal)?;
        notify::send_welcome(&self.notifier, identity.email.clone(), identity.name.clone());

        info!(user_id = %identity.id, role = %identity.role, "user registered");
        Ok((identity, token))
    }

    /// Same error for an unknown email and a wrong password.
    pub async fn authenticate(&self, req: LoginRequest) -> AppResult<(Identity, String)> {
        let (email, plain) = validate::login(req)?;

        let Some(credentials) = self.identities.find_credentials_by_email(&email).await? else {
            password::verify_against_dummy(plain).await;
            warn!("login rejected, unknown email");
            return Err(AppError::InvalidCredentials);
        };

        let ok = password::verify_password_async(plain, credentials.password_hash)
            .await
            .map_err(AppError::internal)?;
        if !ok {
            warn!(user_id = %credentials.identity.id, "login rejected, wrong password");
            return Err(AppError::InvalidCredentials);
        }

        let identity = credentials.identity;
        let token = self.keys.sign(identity.id).map_err(AppError::internal)?;
        info!(user_id = %identity.id, "user logged in");
        Ok((identity, token))
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        Ok(self.identities.find_by_email(email).await?)
    }

    pub async fn profile(&self, id: Uuid) -> AppResult<Identity> {
        self.identities
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn update_profile(&self, id: Uuid, req: UpdateProfileRequest) -> AppResult<Identity> {
        let changes = validate::profile_changes(req)?;
        let identity = self
            .identities
            .update_profile(id, changes)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        info!(user_id = %id, "profile updated");
        Ok(identity)
    }

    /// Re-hashes and stores a new password. Issued session tokens stay valid until they expire.
    pub async fn change_password(&self, id: Uuid, new_password: String) -> AppResult<()> {
        validate::new_password("password", &new_password)?;
        let password_hash = password::hash_password_async(new_password)
            .await
            .map_err(AppError::internal)?;
        if !self.identities.set_password_hash(id, &password_hash).await? {
            return Err(AppError::not_found("User not found"));
        }
        info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Password change initiated by a signed-in user; the current password must match.
    pub async fn change_own_password(&self, id: Uuid, req: ChangePasswordRequest) -> AppResult<()> {
        let mut errors = Vec::new();
        if req.current_password.is_empty() {
            errors.push(FieldError::new(
                "currentPassword",
                "Current password is required",
            ));
        }
        if let Err(AppError::Validation(mut more)) =
            validate::new_password("newPassword", &req.new_password)
        {
            errors.append(&mut more);
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let credentials = self
            .identities
            .find_credentials_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        let ok = password::verify_password_async(req.current_password, credentials.password_hash)
            .await
            .map_err(AppError::internal)?;
        if !ok {
            warn!(user_id = %id, "password change rejected, current password mismatch");
            return Err(AppError::InvalidCredentials);
        }

        self.change_password(id, req.new_password).await
    }
}
