use std::sync::OnceLock;

use actix_web::{dev::ServiceRequest, error::ErrorForbidden, web, Error, HttpMessage};
use actix_web_httpauth::{
    extractors::{basic::BasicAuth, AuthenticationError},
    headers::www_authenticate::basic::Basic,
};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use regex::Regex;

use crate::{
    config::Config,
    db::{timestamp, Store},
    error::{AppError, AppResult},
    models::{non_blank, Role, UserRow},
    session::SessionUser,
    state::AppState,
};

pub const AUTH_REALM: &str = "Hospital Desk";
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 2;
pub const MIN_SPECIALIZATION_LEN: usize = 2;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Doctors always receive an address on the hospital domain; only the
/// submitted local part survives.
pub fn doctor_email(submitted: &str, domain: &str) -> String {
    let local = submitted.split('@').next().unwrap_or_default();
    format!("{local}@{domain}")
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub role: Role,
    pub name: String,
    pub email: String,
    pub password: String,
    pub specialization: Option<String>,
    pub bio: Option<String>,
}

impl Registration {
    fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().chars().count() < MIN_NAME_LEN {
            errors.push("Name required".to_string());
        }
        if !is_valid_email(self.email.trim()) {
            errors.push("Valid email required".to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(format!("Minimum {MIN_PASSWORD_LEN} chars password"));
        }
        if self.role == Role::Doctor {
            let specialization = self.specialization.as_deref().unwrap_or_default();
            if specialization.trim().chars().count() < MIN_SPECIALIZATION_LEN {
                errors.push("Specialization required".to_string());
            }
        }
        errors
    }
}

/// Creates a user and returns its id.
pub async fn register(store: &Store, config: &Config, input: Registration) -> AppResult<i64> {
    let errors = input.problems();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let name = input.name.trim().to_string();
    let (email, specialization, bio) = match input.role {
        Role::Doctor => (
            doctor_email(input.email.trim(), &config.doctor_domain),
            non_blank(input.specialization.map(|value| value.trim().to_string())),
            non_blank(input.bio),
        ),
        Role::Patient => (input.email.trim().to_string(), None, None),
    };

    let exists = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM users WHERE email = ? LIMIT 1")
        .bind(&email)
        .fetch_optional(store.pool())
        .await?;
    if exists.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    if input.role == Role::Doctor {
        warn_on_duplicate_doctor(store, &name, specialization.as_deref().unwrap_or_default()).await?;
    }

    let password_hash = hash_password(&input.password)?;
    let result = sqlx::query(
        r#"INSERT INTO users (role, name, email, password_hash, specialization, bio, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(input.role.as_str())
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(specialization)
    .bind(bio)
    .bind(timestamp())
    .execute(store.pool())
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateEmail,
        other => AppError::Database(other),
    })?;

    log::info!("Registered {} account {}", input.role, email);
    Ok(result.last_insert_rowid())
}

// Duplicate clinicians are still accepted; the appointment queue matches
// them by name and specialization.
async fn warn_on_duplicate_doctor(store: &Store, name: &str, specialization: &str) -> AppResult<()> {
    let duplicates = sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM users
           WHERE role = 'doctor'
             AND lower(trim(name)) = lower(trim(?))
             AND lower(trim(COALESCE(specialization, ''))) = lower(trim(?))"#,
    )
    .bind(name)
    .bind(specialization)
    .fetch_one(store.pool())
    .await?;
    if duplicates > 0 {
        log::warn!("Registering doctor {name:?} ({specialization}) that already has {duplicates} record(s)");
    }
    Ok(())
}

/// Checks an email/password pair. Unknown emails and wrong passwords are
/// reported identically.
pub async fn login(store: &Store, email: &str, password: &str) -> AppResult<SessionUser> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, role, name, email, password_hash, specialization, bio, photo, created_at
           FROM users
           WHERE email = ?
           LIMIT 1"#,
    )
    .bind(email.trim())
    .fetch_optional(store.pool())
    .await?;

    let Some(user) = user else {
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }
    let role = Role::parse(&user.role).ok_or(AppError::InvalidCredentials)?;

    Ok(SessionUser {
        id: user.id,
        role,
        name: user.name,
    })
}

/// Operator account allowed to run administrative maintenance.
#[derive(Clone, Debug)]
pub struct AdminAccount {
    pub username: String,
    password_hash: String,
}

impl AdminAccount {
    pub fn new(username: &str, password: &str) -> Result<Self, password_hash::Error> {
        Ok(Self {
            username: username.to_string(),
            password_hash: hash_password(password)?,
        })
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && verify_password(password, &self.password_hash)
    }
}

#[derive(Clone, Debug)]
pub struct AdminIdentity {
    pub username: String,
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let admin = req
        .app_data::<web::Data<AppState>>()
        .and_then(|state| state.admin.clone());
    let Some(admin) = admin else {
        return Err((ErrorForbidden("Administration is disabled"), req));
    };

    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    if !admin.verify(username, password) {
        log::warn!("Rejected administrator login for {username:?}");
        let challenge = AuthenticationError::new(Basic::with_realm(AUTH_REALM));
        return Err((challenge.into(), req));
    }

    req.extensions_mut().insert(AdminIdentity {
        username: admin.username.clone(),
    });
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_store, TEST_DOMAIN};
    use rstest::rstest;

    fn patient(email: &str) -> Registration {
        Registration {
            role: Role::Patient,
            name: "Priya Raman".into(),
            email: email.into(),
            password: "secret12".into(),
            specialization: None,
            bio: None,
        }
    }

    fn doctor(name: &str, email: &str) -> Registration {
        Registration {
            role: Role::Doctor,
            name: name.into(),
            email: email.into(),
            password: "secret12".into(),
            specialization: Some("Cardiologist".into()),
            bio: Some("  ".into()),
        }
    }

    #[rstest]
    #[case("x@anything.com", "hosp.test", "x@hosp.test")]
    #[case("dr.who@clinic.example.org", "hosp.test", "dr.who@hosp.test")]
    #[case("nodomain", "hosp.test", "nodomain@hosp.test")]
    fn rewrites_doctor_domain(#[case] submitted: &str, #[case] domain: &str, #[case] expected: &str) {
        assert_eq!(doctor_email(submitted, domain), expected);
    }

    #[rstest]
    #[case("a@b.co", true)]
    #[case("first.last@hospital.test", true)]
    #[case("missing-at.example.com", false)]
    #[case("spaces in@example.com", false)]
    #[case("no@tld", false)]
    fn validates_email_shape(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn hashes_verify_only_their_password() {
        let hash = hash_password("doctor123").expect("hash");
        assert!(verify_password("doctor123", &hash));
        assert!(!verify_password("doctor124", &hash));
        assert!(!verify_password("doctor123", "not-a-phc-string"));
    }

    #[actix_web::test]
    async fn stores_doctor_under_configured_domain() {
        let (store, config) = test_store().await;
        let id = register(&store, &config, doctor("Dr. X", "x@anything.com"))
            .await
            .expect("register doctor");

        let (email, bio) = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT email, bio FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(store.pool())
        .await
        .expect("stored doctor");
        assert_eq!(email, format!("x@{TEST_DOMAIN}"));
        assert_eq!(bio, None);
    }

    #[actix_web::test]
    async fn trims_specialization_but_keeps_bio_as_typed() {
        let (store, config) = test_store().await;
        let mut input = doctor("Dr. Y", "y@anything.com");
        input.specialization = Some(" Cardiologist ".into());
        input.bio = Some(" Sees adults only ".into());
        let id = register(&store, &config, input).await.expect("register doctor");

        let (specialization, bio) = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT specialization, bio FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(store.pool())
        .await
        .expect("stored doctor");
        assert_eq!(specialization.as_deref(), Some("Cardiologist"));
        assert_eq!(bio.as_deref(), Some(" Sees adults only "));
    }

    #[actix_web::test]
    async fn rejects_duplicate_email_after_rewrite() {
        let (store, config) = test_store().await;
        register(&store, &config, doctor("Dr. X", "x@anything.com"))
            .await
            .expect("first doctor");

        let err = register(&store, &config, doctor("Dr. Y", "x@elsewhere.org"))
            .await
            .expect_err("same local part collides");
        assert!(matches!(err, AppError::DuplicateEmail));
    }

    #[actix_web::test]
    async fn rejects_duplicate_patient_email() {
        let (store, config) = test_store().await;
        register(&store, &config, patient("p@example.com"))
            .await
            .expect("first patient");
        let err = register(&store, &config, patient("p@example.com"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, AppError::DuplicateEmail));
    }

    #[actix_web::test]
    async fn reports_every_invalid_field() {
        let (store, config) = test_store().await;
        let input = Registration {
            role: Role::Doctor,
            name: " A ".into(),
            email: "not-an-email".into(),
            password: "123".into(),
            specialization: Some(" ".into()),
            bio: None,
        };
        let Err(AppError::Validation(messages)) = register(&store, &config, input).await else {
            panic!("expected validation error");
        };
        assert_eq!(
            messages,
            vec![
                "Name required".to_string(),
                "Valid email required".to_string(),
                "Minimum 6 chars password".to_string(),
                "Specialization required".to_string(),
            ]
        );
    }

    #[actix_web::test]
    async fn patients_never_keep_doctor_fields() {
        let (store, config) = test_store().await;
        let mut input = patient("p@example.com");
        input.specialization = Some("Cardiologist".into());
        input.bio = Some("bio".into());
        let id = register(&store, &config, input).await.expect("register");

        let (specialization, bio) = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT specialization, bio FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(store.pool())
        .await
        .expect("stored patient");
        assert_eq!(specialization, None);
        assert_eq!(bio, None);
    }

    #[actix_web::test]
    async fn duplicate_doctor_names_are_accepted() {
        let (store, config) = test_store().await;
        register(&store, &config, doctor("Dr. A", "a1@x.com")).await.expect("first");
        register(&store, &config, doctor(" dr. a ", "a2@x.com")).await.expect("second");
    }

    #[actix_web::test]
    async fn login_succeeds_only_with_matching_password() {
        let (store, config) = test_store().await;
        let id = register(&store, &config, patient("p@example.com"))
            .await
            .expect("register");

        let user = login(&store, "p@example.com", "secret12").await.expect("login");
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Patient);
        assert_eq!(user.name, "Priya Raman");

        let wrong_password = login(&store, "p@example.com", "secret13")
            .await
            .expect_err("wrong password");
        let unknown_email = login(&store, "q@example.com", "secret12")
            .await
            .expect_err("unknown email");
        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[test]
    fn admin_account_checks_both_fields() {
        let admin = AdminAccount::new("admin", "operator-secret").expect("admin");
        assert!(admin.verify("admin", "operator-secret"));
        assert!(!admin.verify("root", "operator-secret"));
        assert!(!admin.verify("admin", "wrong"));
    }
}
