use actix_web::{web, HttpResponse, Result};
use askama::Template;

use crate::{
    doctors::{get_doctor, list_doctors},
    error::AppError,
    models::{Doctor, Role},
    session::SessionContext,
    state::AppState,
    templates::{render, Chrome},
};

#[derive(Template)]
#[template(path = "doctors.html")]
struct DoctorsTemplate {
    chrome: Chrome,
    doctors: Vec<Doctor>,
}

#[derive(Template)]
#[template(path = "doctor.html")]
struct DoctorTemplate {
    chrome: Chrome,
    doctor: Doctor,
    has_bio: bool,
    can_book: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/doctors")
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/{id}").route(web::get().to(show))),
    );
}

async fn index(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse, AppError> {
    let doctors = list_doctors(&state.store).await?;
    Ok(render(DoctorsTemplate {
        chrome: Chrome::from_session(&session),
        doctors,
    }))
}

async fn show(
    state: web::Data<AppState>,
    session: SessionContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    // Non-numeric ids are indistinguishable from missing doctors.
    let id = path.trim().parse::<i64>().map_err(|_| AppError::NotFound)?;
    let doctor = get_doctor(&state.store, id).await?;
    let can_book = session
        .user()
        .is_some_and(|user| user.role == Role::Patient);

    Ok(render(DoctorTemplate {
        chrome: Chrome::from_session(&session),
        has_bio: !doctor.bio.trim().is_empty(),
        doctor,
        can_book,
    }))
}
