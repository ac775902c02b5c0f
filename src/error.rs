use actix_web::{http::header, http::StatusCode, HttpResponse, ResponseError};

use crate::templates::{render_status, Chrome, ErrorTemplate};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),
    /// A well-formed booking for an id that is not a doctor.
    #[error("Invalid doctor")]
    InvalidDoctor,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not found")]
    NotFound,
    #[error("Forbidden")]
    Forbidden,
    #[error("Login required")]
    Unauthenticated,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    /// Errors the visitor can fix by resubmitting the form.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidDoctor
                | Self::DuplicateEmail
                | Self::InvalidCredentials
        )
    }

    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::PasswordHash(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidDoctor | Self::DuplicateEmail => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::SEE_OTHER,
            Self::Database(_) | Self::PasswordHash(_) | Self::Session(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (title, message) = match self {
            Self::Unauthenticated => {
                return HttpResponse::SeeOther()
                    .append_header((header::LOCATION, "/auth/login"))
                    .insert_header((header::CACHE_CONTROL, "no-store"))
                    .finish();
            }
            Self::NotFound => (
                "Page not found",
                "The page you were looking for does not exist.".to_string(),
            ),
            Self::Forbidden => (
                "Access denied",
                "Your account cannot open this page.".to_string(),
            ),
            Self::Validation(_)
            | Self::InvalidDoctor
            | Self::DuplicateEmail
            | Self::InvalidCredentials => ("Request rejected", self.messages().join(" ")),
            Self::Database(_) | Self::PasswordHash(_) | Self::Session(_) | Self::Io(_) => {
                log::error!("Unhandled error: {self}");
                (
                    "Something went wrong",
                    "We could not complete your request. Please try again later.".to_string(),
                )
            }
        };

        render_status(
            status,
            ErrorTemplate {
                chrome: Chrome::default(),
                status: status.as_u16(),
                title,
                message,
            },
        )
    }
}
