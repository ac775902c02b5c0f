use std::{env, fmt::Display, path::PathBuf, str::FromStr};

pub const RESEED_FLAG: &str = "seed_v2_applied.flag";
pub const DEFAULT_DOCTOR_DOMAIN: &str = "hospital.test";
pub const DEFAULT_SEED_PASSWORD: &str = "doctor123";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub session_database_url: String,
    pub data_dir: PathBuf,
    pub doctor_domain: String,
    pub seed_doctor_password: String,
    pub admin_user: String,
    pub admin_password: Option<String>,
    pub session_secret: Option<String>,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let seed_doctor_password = load_or("SEED_DOCTOR_PASSWORD", DEFAULT_SEED_PASSWORD);
        if seed_doctor_password == DEFAULT_SEED_PASSWORD {
            log::warn!(
                "SEED_DOCTOR_PASSWORD not set. Built-in doctors use the default password. Set SEED_DOCTOR_PASSWORD in production."
            );
        }

        let admin_password = env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if admin_password.is_none() {
            log::info!("ADMIN_PASSWORD not set, administration endpoints are disabled");
        }

        Self {
            port: parse_or("PORT", 8080),
            database_url: load_or("DATABASE_URL", "sqlite://./data/hospital.sqlite"),
            session_database_url: load_or(
                "SESSION_DATABASE_URL",
                "sqlite://./data/sessions.sqlite",
            ),
            data_dir: PathBuf::from(load_or("DATA_DIR", "./data")),
            doctor_domain: load_or("HOSPITAL_DOMAIN", DEFAULT_DOCTOR_DOMAIN),
            seed_doctor_password,
            admin_user: load_or("ADMIN_USER", "admin"),
            admin_password,
            session_secret: env::var("SESSION_SECRET").ok(),
            cookie_secure: parse_or("COOKIE_SECURE", false),
        }
    }

    pub fn reseed_flag_path(&self) -> PathBuf {
        self.data_dir.join(RESEED_FLAG)
    }
}

fn load_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|err| {
            log::warn!("Invalid {key} value {raw:?}: {err}. Using default: {default}");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
impl Config {
    /// Configuration pointing at a scratch data directory, with in-memory stores.
    pub fn for_tests(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            session_database_url: "sqlite::memory:".to_string(),
            data_dir: data_dir.into(),
            doctor_domain: "hosp.test".to_string(),
            seed_doctor_password: "doctor123".to_string(),
            admin_user: "admin".to_string(),
            admin_password: Some("operator-secret".to_string()),
            session_secret: None,
            cookie_secure: false,
        }
    }
}
