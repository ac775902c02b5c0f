//! Fixtures shared by unit and handler tests.

use crate::{
    auth::AdminAccount,
    config::Config,
    db::{timestamp, Store},
    models::Role,
    session::SqliteSessionStore,
    state::AppState,
};

pub const TEST_DOMAIN: &str = "hosp.test";

pub fn test_config() -> Config {
    Config::for_tests(std::env::temp_dir().join("hospital-desk-tests"))
}

pub async fn test_store() -> (Store, Config) {
    let store = Store::in_memory().await.expect("in-memory store");
    (store, test_config())
}

pub async fn test_state() -> AppState {
    let (store, config) = test_store().await;
    let sessions = SqliteSessionStore::in_memory().await.expect("session store");
    let admin = config
        .admin_password
        .as_deref()
        .map(|password| AdminAccount::new(&config.admin_user, password).expect("admin hash"));
    AppState::new(store, sessions, config, admin)
}

/// Inserts a user directly, bypassing validation and hashing. The stored
/// hash never verifies.
pub async fn insert_user(
    store: &Store,
    role: Role,
    name: &str,
    email: &str,
    specialization: Option<&str>,
) -> i64 {
    sqlx::query(
        r#"INSERT INTO users (role, name, email, password_hash, specialization, created_at)
           VALUES (?, ?, ?, 'unusable', ?, ?)"#,
    )
    .bind(role.as_str())
    .bind(name)
    .bind(email)
    .bind(specialization)
    .bind(timestamp())
    .execute(store.pool())
    .await
    .expect("insert user")
    .last_insert_rowid()
}

pub async fn insert_appointment(store: &Store, patient_id: i64, doctor_id: i64, status: &str) -> i64 {
    sqlx::query(
        r#"INSERT INTO appointments (patient_id, doctor_id, appt_date, appt_time, concern, status, created_at)
           VALUES (?, ?, '2030-01-15', '09:30', 'Persistent headaches', ?, ?)"#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(status)
    .bind(timestamp())
    .execute(store.pool())
    .await
    .expect("insert appointment")
    .last_insert_rowid()
}
