//! Server-side sessions.
//!
//! `actix-session` owns the cookie and the session lifecycle; the browser
//! only holds the session key. Session state (signed-in user and pending
//! flash messages) is kept in its own SQLite file so that the hospital store
//! can be reset without touching it, and the other way round.

use std::{
    collections::HashMap,
    future::{ready, Ready},
    str::FromStr,
};

use actix_session::{
    config::{CookieContentSecurity, PersistentSession},
    storage::{LoadError, SaveError, SessionKey, SessionStore, UpdateError},
    Session, SessionExt, SessionMiddleware,
};
use actix_web::{
    cookie::{time::Duration, Key, SameSite},
    dev::Payload,
    Error, FromRequest, HttpRequest,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Role,
};

pub const SESSION_COOKIE: &str = "hms_session";
pub const SESSION_TTL_HOURS: i64 = 24;

const USER_KEY: &str = "user";
const FLASH_KEY: &str = "flash";

type SessionState = HashMap<String, String>;

/// The minimal projection of a user cached for the session's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub role: Role,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

impl FlashMessage {
    pub fn css_class(&self) -> &'static str {
        match self.level {
            FlashLevel::Success => "flash flash-success",
            FlashLevel::Error => "flash flash-error",
        }
    }
}

/// `actix-session` storage backend over a `sessions` table.
#[derive(Clone, Debug)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub async fn connect(db_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS sessions (
                   id TEXT PRIMARY KEY,
                   data TEXT NOT NULL,
                   expires_at INTEGER NOT NULL
               )"#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[cfg(test)]
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await
    }

    #[cfg(test)]
    pub async fn expire_all(&self) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET expires_at = 0")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert(&self, key: &SessionKey, state: &SessionState, ttl: &Duration) -> anyhow::Result<()> {
        let raw = serde_json::to_string(state)?;
        sqlx::query("INSERT INTO sessions (id, data, expires_at) VALUES (?, ?, ?)")
            .bind(key.as_ref())
            .bind(raw)
            .bind(expires_at(ttl))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn expires_at(ttl: &Duration) -> i64 {
    Utc::now().timestamp() + ttl.whole_seconds()
}

fn new_session_key() -> Result<SessionKey, anyhow::Error> {
    SessionKey::try_from(Uuid::new_v4().to_string()).map_err(Into::into)
}

impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<SessionState>, LoadError> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT data FROM sessions WHERE id = ? AND expires_at > ?",
        )
        .bind(session_key.as_ref())
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| LoadError::Other(err.into()))?;

        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| LoadError::Deserialization(err.into()))
    }

    async fn save(&self, session_state: SessionState, ttl: &Duration) -> Result<SessionKey, SaveError> {
        let key = new_session_key().map_err(SaveError::Other)?;
        self.insert(&key, &session_state, ttl)
            .await
            .map_err(SaveError::Other)?;
        Ok(key)
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: SessionState,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        let raw = serde_json::to_string(&session_state)
            .map_err(|err| UpdateError::Serialization(err.into()))?;
        let updated = sqlx::query("UPDATE sessions SET data = ?, expires_at = ? WHERE id = ?")
            .bind(raw)
            .bind(expires_at(ttl))
            .bind(session_key.as_ref())
            .execute(&self.pool)
            .await
            .map_err(|err| UpdateError::Other(err.into()))?;

        // The row expired or was purged between load and update.
        if updated.rows_affected() == 0 {
            return self.save(session_state, ttl).await.map_err(|err| match err {
                SaveError::Serialization(err) => UpdateError::Serialization(err),
                SaveError::Other(err) => UpdateError::Other(err),
            });
        }
        Ok(session_key)
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
            .bind(expires_at(ttl))
            .bind(session_key.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_key.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Cookie signing key. A `SESSION_SECRET` shorter than 64 bytes is ignored
/// and a per-process key is generated, which signs everyone out on restart.
pub fn session_key(secret: Option<&str>) -> Key {
    match secret.map(|secret| Key::try_from(secret.as_bytes())) {
        Some(Ok(key)) => key,
        Some(Err(err)) => {
            log::warn!("SESSION_SECRET rejected ({err}), generating a temporary key");
            Key::generate()
        }
        None => {
            log::warn!("SESSION_SECRET not set, sessions will not survive a restart");
            Key::generate()
        }
    }
}

pub fn session_middleware(
    store: SqliteSessionStore,
    key: Key,
    cookie_secure: bool,
) -> SessionMiddleware<SqliteSessionStore> {
    SessionMiddleware::builder(store, key)
        .cookie_name(SESSION_COOKIE.to_string())
        .cookie_path("/".to_string())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(SameSite::Lax)
        .session_lifecycle(PersistentSession::default().session_ttl(Duration::hours(SESSION_TTL_HOURS)))
        .build()
}

/// Typed access to the signed-in user and flash messages.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// An unreadable user entry counts as signed out.
    pub fn user(&self) -> Option<SessionUser> {
        self.0.get::<SessionUser>(USER_KEY).unwrap_or_else(|err| {
            log::warn!("Ignoring unreadable session user: {err}");
            None
        })
    }

    /// Guard for protected operations: no user is `Unauthenticated`, a role
    /// mismatch is `Forbidden`.
    pub fn require_role(&self, role: Option<Role>) -> AppResult<SessionUser> {
        let user = self.user().ok_or(AppError::Unauthenticated)?;
        match role {
            Some(role) if user.role != role => Err(AppError::Forbidden),
            _ => Ok(user),
        }
    }

    /// Stores the user and rotates the session key.
    pub fn sign_in(&self, user: SessionUser) -> AppResult<()> {
        self.insert(USER_KEY, user)?;
        self.0.renew();
        Ok(())
    }

    pub fn sign_out(&self) {
        self.0.purge();
    }

    pub fn rename(&self, name: &str) -> AppResult<()> {
        match self.user() {
            Some(mut user) => {
                user.name = name.to_string();
                self.insert(USER_KEY, user)
            }
            None => Ok(()),
        }
    }

    pub fn flash(&self, level: FlashLevel, text: impl Into<String>) -> AppResult<()> {
        let mut flash = self.pending_flash();
        flash.push(FlashMessage {
            level,
            text: text.into(),
        });
        self.insert(FLASH_KEY, flash)
    }

    pub fn flash_success(&self, text: impl Into<String>) -> AppResult<()> {
        self.flash(FlashLevel::Success, text)
    }

    pub fn flash_errors(&self, messages: Vec<String>) -> AppResult<()> {
        for message in messages {
            self.flash(FlashLevel::Error, message)?;
        }
        Ok(())
    }

    /// Drains pending flash messages for display.
    pub fn take_flash(&self) -> Vec<FlashMessage> {
        let flash = self.pending_flash();
        // `remove` marks the session changed even when the key is absent.
        if !flash.is_empty() {
            self.0.remove(FLASH_KEY);
        }
        flash
    }

    fn pending_flash(&self) -> Vec<FlashMessage> {
        self.0
            .get::<Vec<FlashMessage>>(FLASH_KEY)
            .unwrap_or_else(|err| {
                log::warn!("Dropping unreadable flash messages: {err}");
                None
            })
            .unwrap_or_default()
    }

    fn insert(&self, key: &str, value: impl Serialize) -> AppResult<()> {
        self.0
            .insert(key, value)
            .map_err(|err| AppError::Session(err.to_string()))
    }
}

impl FromRequest for SessionContext {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(SessionContext::new(req.get_session())))
    }
}
