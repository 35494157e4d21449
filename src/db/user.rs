use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::credentials::{CredentialStore, NewUser, ProfileFields, StoreError, User};

const SELECT_BY_ID: &str = "SELECT id, email, password_hash, name, birth_date, address, created_at
     FROM users WHERE id = ?";

const SELECT_BY_EMAIL: &str = "SELECT id, email, password_hash, name, birth_date, address, created_at
     FROM users WHERE email = ?";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    name: Option<String>,
    birth_date: Option<String>,
    address: Option<String>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            birth_date: row.birth_date,
            address: row.address,
            created_at: row.created_at,
        }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, sql: &'static str, value: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl CredentialStore for UserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one(SELECT_BY_EMAIL, email).await.map_err(backend)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one(SELECT_BY_ID, id).await.map_err(backend)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, birth_date, address)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.profile.name)
        .bind(&new_user.profile.birth_date)
        .bind(&new_user.profile.address)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::AlreadyExists);
            }
            Err(e) => return Err(backend(e)),
        }

        self.fetch_one(SELECT_BY_ID, &id)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::Backend("Inserted user not found".into()))
    }

    async fn update_profile(
        &self,
        id: &str,
        fields: &ProfileFields,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query(
            "UPDATE users SET
                name = COALESCE(?, name),
                birth_date = COALESCE(?, birth_date),
                address = COALESCE(?, address)
             WHERE id = ?",
        )
        .bind(&fields.name)
        .bind(&fields.birth_date)
        .bind(&fields.address)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        self.fetch_one(SELECT_BY_ID, id).await.map_err(backend)
    }
}
