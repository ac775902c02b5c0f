use actix_web::{http::StatusCode, HttpResponse};
use askama::Template;

use crate::{
    models::Role,
    session::{FlashMessage, SessionContext},
};

/// Navigation and flash data every page layout needs.
#[derive(Clone, Debug, Default)]
pub struct Chrome {
    pub signed_in: bool,
    pub user_name: String,
    pub is_doctor: bool,
    pub is_patient: bool,
    pub flash: Vec<FlashMessage>,
}

impl Chrome {
    /// Consumes the session's pending flash messages.
    pub fn from_session(session: &SessionContext) -> Self {
        let user = session.user();
        Self {
            signed_in: user.is_some(),
            user_name: user.as_ref().map(|user| user.name.clone()).unwrap_or_default(),
            is_doctor: user.as_ref().is_some_and(|user| user.role == Role::Doctor),
            is_patient: user.as_ref().is_some_and(|user| user.role == Role::Patient),
            flash: session.take_flash(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub chrome: Chrome,
    pub status: u16,
    pub title: &'static str,
    pub message: String,
}

pub fn render<T: Template>(template: T) -> HttpResponse {
    render_status(StatusCode::OK, template)
}

pub fn render_status<T: Template>(status: StatusCode, template: T) -> HttpResponse {
    match template.render() {
        Ok(body) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Template render error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
