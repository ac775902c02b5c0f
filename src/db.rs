use std::{fs, path::Path, str::FromStr};

use chrono::{SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{auth::hash_password, config::Config, error::AppResult, models::Role};

/// Local part, display name, specialization and bio of the doctors every
/// installation starts with.
pub const BUILT_IN_DOCTORS: [(&str, &str, &str, &str); 5] = [
    (
        "aditi.sharma",
        "Dr. Aditi Sharma",
        "Cardiologist",
        "Compassionate cardiologist focused on preventive heart care.",
    ),
    (
        "rajesh.iyer",
        "Dr. Rajesh Iyer",
        "Neurologist",
        "Specialist in brain and nervous system disorders.",
    ),
    (
        "kavya.patel",
        "Dr. Kavya Patel",
        "Pediatrician",
        "Caring pediatrician dedicated to children's health.",
    ),
    (
        "arjun.mehta",
        "Dr. Arjun Mehta",
        "Orthopedic Surgeon",
        "Expert in bone and joint treatments and sports injuries.",
    ),
    (
        "sneha.nair",
        "Dr. Sneha Nair",
        "Dermatologist",
        "Skin and hair specialist using modern therapies.",
    ),
];

/// Handle on the hospital database. Cheap to clone; every handler gets it
/// through application state.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(db_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// A private database that lives as long as the returned handle.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Wipes the store once per data directory, guarded by the sentinel file.
    pub async fn reseed_if_needed(&self, config: &Config) -> AppResult<bool> {
        let flag = config.reseed_flag_path();
        if flag.exists() {
            return Ok(false);
        }
        if let Some(parent) = flag.parent() {
            fs::create_dir_all(parent)?;
        }

        log::info!("Reseed sentinel missing, resetting store to built-in doctors");
        self.force_reseed(config).await?;
        fs::write(&flag, "ok")?;
        Ok(true)
    }

    /// Deletes every appointment and user, then inserts the built-in doctors.
    pub async fn force_reseed(&self, config: &Config) -> AppResult<()> {
        let password_hash = hash_password(&config.seed_doctor_password)?;
        let now = timestamp();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM appointments")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
        for (local, name, specialization, bio) in BUILT_IN_DOCTORS {
            sqlx::query(
                r#"INSERT INTO users (role, name, email, password_hash, specialization, bio, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Role::Doctor.as_str())
            .bind(name)
            .bind(format!("{local}@{}", config.doctor_domain))
            .bind(&password_hash)
            .bind(specialization)
            .bind(bio)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Inserts any built-in doctor whose email is missing. Returns how many
    /// rows were added.
    pub async fn seed_defaults(&self, config: &Config) -> AppResult<usize> {
        let mut missing = Vec::new();
        for doctor in BUILT_IN_DOCTORS {
            let email = format!("{}@{}", doctor.0, config.doctor_domain);
            let exists = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM users WHERE email = ? LIMIT 1")
                .bind(&email)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                missing.push((email, doctor));
            }
        }

        if missing.is_empty() {
            return Ok(0);
        }

        let password_hash = hash_password(&config.seed_doctor_password)?;
        let now = timestamp();
        for (email, (_, name, specialization, bio)) in &missing {
            sqlx::query(
                r#"INSERT INTO users (role, name, email, password_hash, specialization, bio, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Role::Doctor.as_str())
            .bind(name)
            .bind(email)
            .bind(&password_hash)
            .bind(specialization)
            .bind(bio)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }
        log::info!("Seeded {} built-in doctor(s)", missing.len());
        Ok(missing.len())
    }
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Fixed-width UTC timestamp so that text ordering matches time ordering.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
