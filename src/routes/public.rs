use actix_web::{web, HttpResponse, Result};
use askama::Template;

use crate::{
    doctors::list_doctors,
    error::AppError,
    models::Doctor,
    session::SessionContext,
    state::AppState,
    templates::{render, Chrome},
};

const FEATURED_DOCTORS: usize = 3;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    chrome: Chrome,
    featured: Vec<Doctor>,
    doctor_count: usize,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn home(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse, AppError> {
    let doctors = list_doctors(&state.store).await?;
    let doctor_count = doctors.len();
    let featured = doctors.into_iter().take(FEATURED_DOCTORS).collect();

    Ok(render(HomeTemplate {
        chrome: Chrome::from_session(&session),
        featured,
        doctor_count,
    }))
}

pub async fn not_found() -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound)
}
