use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::AppError,
    users::repo_types::{NewUser, ProfileUpdate, User, UserRow},
};

/// Credential store. Every read returns active users only.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: &NewUser) -> Result<User, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Matches the stored hash and requires `expires > now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError>;
    async fn list_active(&self) -> Result<Vec<User>, AppError>;
    /// Sets or clears hash and expiry together.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> Result<(), AppError>;
    /// Stores a new hash, stamps `password_changed_at` and clears any reset token.
    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), AppError>;
    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate)
        -> Result<Option<User>, AppError>;
    async fn deactivate(&self, id: Uuid) -> Result<(), AppError>;
}

const USER_COLUMNS: &str = "id, name, email, photo, role, password_hash, password_changed_at, \
     password_reset_token, password_reset_expires, active, created_at";

const EMAIL_TAKEN: &str = "This email is already registered";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, AppError> {
    row.map(User::try_from).transpose().map_err(AppError::from)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: &NewUser) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, email, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.role.as_str())
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_db(e, EMAIL_TAKEN))?;
        Ok(User::try_from(row)?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        into_user(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        into_user(row)
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE password_reset_token = $1
               AND password_reset_expires > $2
               AND active
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        into_user(row)
    }

    async fn list_active(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE active ORDER BY created_at"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter()
            .map(|r| User::try_from(r).map_err(AppError::from))
            .collect()
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> Result<(), AppError> {
        let (hash, expires) = token.unzip();
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token = $2, password_reset_expires = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .bind(expires)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   password_changed_at = $3,
                   password_reset_token = NULL,
                   password_reset_expires = NULL
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   photo = COALESCE($4, photo)
             WHERE id = $1 AND active
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.email.as_deref())
        .bind(update.photo.as_deref())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::from_db(e, EMAIL_TAKEN))?;
        into_user(row)
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
