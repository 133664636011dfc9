use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{Credentials, Identity, IdentityRow, NewIdentity, ProfileChanges};
use crate::db::StoreError;

/// Persistence for identity records.
///
/// Email uniqueness is the store's job: `create` must fail with
/// [`StoreError::Conflict`] for a taken email even when two writers race.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Internal read path that includes the password hash.
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, StoreError>;

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, StoreError>;

    /// Returns `None` when no identity has this id.
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<Identity>, StoreError>;

    /// Returns `false` when no identity has this id.
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool, StoreError>;
}

const IDENTITY_COLUMNS: &str = "id, name, email, password_hash, role, company, location, bio, \
     skills, experience, education, resume, created_at, updated_at";

#[derive(Clone)]
pub struct PgIdentityStore {
    db: PgPool,
}

impl PgIdentityStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn row_by_id(&self, id: Uuid) -> Result<Option<IdentityRow>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn row_by_email(&self, email: &str) -> Result<Option<IdentityRow>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, company)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {IDENTITY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .bind(&new.company)
            .fetch_one(&self.db)
            .await?;
        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        self.row_by_id(id)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.row_by_email(email)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        self.row_by_email(email)
            .await?
            .map(Credentials::try_from)
            .transpose()
    }

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, StoreError> {
        self.row_by_id(id)
            .await?
            .map(Credentials::try_from)
            .transpose()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET name       = COALESCE($2, name),
                bio        = COALESCE($3, bio),
                location   = COALESCE($4, location),
                skills     = COALESCE($5, skills),
                experience = COALESCE($6, experience),
                education  = COALESCE($7, education),
                updated_at = now()
            WHERE id = $1
            RETURNING {IDENTITY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.bio)
            .bind(changes.location)
            .bind(changes.skills)
            .bind(changes.experience)
            .bind(changes.education)
            .fetch_optional(&self.db)
            .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
