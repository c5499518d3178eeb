use std::{collections::BTreeMap, sync::Arc};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use rand::Rng;
use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::{Snippet, User, UserId},
};

/// Number of snippets shown on the home page.
pub const LATEST_LIMIT: usize = 10;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, so handlers and the
/// identity resolver work the same against Postgres, the in-memory store, or a test stub.
///
/// **Send + Sync + async_trait** are required to share it as `Arc<dyn Repository>`
/// across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Snippets ---
    async fn insert_snippet(&self, title: &str, content: &str, expires_days: i32) -> AppResult<i64>;
    // Returns only snippets that have not expired.
    async fn get_snippet(&self, id: i64) -> AppResult<Option<Snippet>>;
    async fn latest_snippets(&self) -> AppResult<Vec<Snippet>>;

    // --- Users ---
    // Fails with `AppError::DuplicateEmail` when the address is taken.
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> AppResult<()>;
    // `None` when the email is unknown or the password does not verify.
    async fn authenticate(&self, email: &str, password: &str) -> AppResult<Option<UserId>>;
    // Existence check consulted by the identity resolver on every request.
    async fn user_exists(&self, id: UserId) -> AppResult<bool>;
    async fn get_user(&self, id: UserId) -> AppResult<Option<User>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// Argon2 is CPU-bound, so both directions run on the blocking pool.

async fn hash_password(password: &str) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || -> AppResult<String> {
        let salt_bytes: [u8; 16] = rand::rng().random();
        let salt = SaltString::encode_b64(&salt_bytes)?;
        Ok(Argon2::default()
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

async fn verify_password(hash: String, password: &str) -> AppResult<bool> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        PasswordHash::new(&hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))
}

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL. The schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn insert_snippet(&self, title: &str, content: &str, expires_days: i32) -> AppResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, NOW(), NOW() + make_interval(days => $3))
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(expires_days)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_snippet(&self, id: i64) -> AppResult<Option<Snippet>> {
        let snippet = sqlx::query_as::<_, Snippet>(
            "SELECT id, title, content, created, expires FROM snippets WHERE expires > NOW() AND id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snippet)
    }

    async fn latest_snippets(&self) -> AppResult<Vec<Snippet>> {
        let snippets = sqlx::query_as::<_, Snippet>(
            "SELECT id, title, content, created, expires FROM snippets WHERE expires > NOW() ORDER BY id DESC LIMIT $1",
        )
        .bind(LATEST_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(snippets)
    }

    /// insert_user
    ///
    /// Relies on the `users_uc_email` unique constraint instead of a read-then-write,
    /// so two concurrent signups for one address cannot both succeed.
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> AppResult<()> {
        let hashed = hash_password(password).await?;
        let result = sqlx::query(
            "INSERT INTO users (name, email, hashed_password, created) VALUES ($1, $2, $3, NOW())",
        )
        .bind(name)
        .bind(email)
        .bind(hashed)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> AppResult<Option<UserId>> {
        let row: Option<(UserId, String)> =
            sqlx::query_as("SELECT id, hashed_password FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, hash)) = row else {
            return Ok(None);
        };
        Ok(verify_password(hash, password).await?.then_some(id))
    }

    async fn user_exists(&self, id: UserId) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT true FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, name, email, created FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

struct StoredUser {
    user: User,
    hashed_password: String,
}

#[derive(Default)]
struct MemoryData {
    snippets: BTreeMap<i64, Snippet>,
    users: BTreeMap<UserId, StoredUser>,
    next_snippet_id: i64,
    next_user_id: UserId,
}

/// MemoryRepository
///
/// In-process implementation used when no `DATABASE_URL` is configured, and by the
/// test suite. Writes are serialized by a single lock.
#[derive(Default)]
pub struct MemoryRepository {
    data: RwLock<MemoryData>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a user outright, leaving any session that references it stale.
    pub fn delete_user(&self, id: UserId) -> bool {
        self.data.write().users.remove(&id).is_some()
    }

    pub fn snippet_count(&self) -> usize {
        self.data.read().snippets.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_snippet(&self, title: &str, content: &str, expires_days: i32) -> AppResult<i64> {
        let now = Utc::now();
        let mut data = self.data.write();
        data.next_snippet_id += 1;
        let id = data.next_snippet_id;
        data.snippets.insert(
            id,
            Snippet {
                id,
                title: title.to_string(),
                content: content.to_string(),
                created: now,
                expires: now + Duration::days(i64::from(expires_days)),
            },
        );
        Ok(id)
    }

    async fn get_snippet(&self, id: i64) -> AppResult<Option<Snippet>> {
        let now = Utc::now();
        Ok(self
            .data
            .read()
            .snippets
            .get(&id)
            .filter(|snippet| snippet.expires > now)
            .cloned())
    }

    async fn latest_snippets(&self) -> AppResult<Vec<Snippet>> {
        let now = Utc::now();
        Ok(self
            .data
            .read()
            .snippets
            .values()
            .rev()
            .filter(|snippet| snippet.expires > now)
            .take(LATEST_LIMIT)
            .cloned()
            .collect())
    }

    async fn insert_user(&self, name: &str, email: &str, password: &str) -> AppResult<()> {
        let hashed_password = hash_password(password).await?;
        let mut data = self.data.write();
        if data.users.values().any(|stored| stored.user.email == email) {
            return Err(AppError::DuplicateEmail);
        }
        data.next_user_id += 1;
        let id = data.next_user_id;
        data.users.insert(
            id,
            StoredUser {
                user: User {
                    id,
                    name: name.to_string(),
                    email: email.to_string(),
                    created: Utc::now(),
                },
                hashed_password,
            },
        );
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> AppResult<Option<UserId>> {
        let candidate = self
            .data
            .read()
            .users
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| (stored.user.id, stored.hashed_password.clone()));

        let Some((id, hash)) = candidate else {
            return Ok(None);
        };
        Ok(verify_password(hash, password).await?.then_some(id))
    }

    async fn user_exists(&self, id: UserId) -> AppResult<bool> {
        Ok(self.data.read().users.contains_key(&id))
    }

    async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.data.read().users.get(&id).map(|stored| stored.user.clone()))
    }
}
