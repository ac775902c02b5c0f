use actix_web::{http::header, web, HttpResponse};

use crate::{
    error::{AppError, AppResult},
    session::SessionContext,
};

pub mod admin;
pub mod appointments;
pub mod auth;
pub mod dashboard;
pub mod doctors;
pub mod profile;
pub mod public;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(public::configure)
        .configure(auth::configure)
        .configure(doctors::configure)
        .configure(appointments::configure)
        .configure(dashboard::configure)
        .configure(profile::configure)
        .configure(admin::configure);
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

/// Turns a correctable error into flash messages and a redirect back to
/// the form; everything else propagates to the error pages.
pub fn back_to_form(session: &SessionContext, err: AppError, location: &str) -> AppResult<HttpResponse> {
    if err.is_user_facing() {
        session.flash_errors(err.messages())?;
        Ok(redirect(location))
    } else {
        Err(err)
    }
}
