use actix_web::{web, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    error::AppError,
    models::Role,
    profile::{get_profile, update_profile, ProfileUpdate},
    routes::{back_to_form, redirect},
    session::SessionContext,
    state::AppState,
    templates::{render, Chrome},
};

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    chrome: Chrome,
    name: String,
    email: String,
    role: String,
    is_doctor: bool,
    specialization: String,
    bio: String,
    photo: String,
}

#[derive(Deserialize)]
struct ProfileForm {
    name: String,
    specialization: Option<String>,
    bio: Option<String>,
    photo: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/profile")
            .route(web::get().to(show))
            .route(web::post().to(save)),
    );
}

async fn show(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse, AppError> {
    let user = session.require_role(None)?;
    let profile = match get_profile(&state.store, user.id).await {
        Ok(profile) => profile,
        Err(AppError::NotFound) => {
            session.flash_errors(vec!["Profile not found. Please log in again.".to_string()])?;
            return Ok(redirect("/dashboard"));
        }
        Err(err) => return Err(err),
    };

    Ok(render(ProfileTemplate {
        chrome: Chrome::from_session(&session),
        is_doctor: profile.role == Role::Doctor.as_str(),
        name: profile.name,
        email: profile.email,
        role: profile.role,
        specialization: profile.specialization.unwrap_or_default(),
        bio: profile.bio.unwrap_or_default(),
        photo: profile.photo.unwrap_or_default(),
    }))
}

async fn save(
    state: web::Data<AppState>,
    session: SessionContext,
    form: web::Form<ProfileForm>,
) -> Result<HttpResponse, AppError> {
    let user = session.require_role(None)?;
    let form = form.into_inner();
    let update = ProfileUpdate {
        name: form.name,
        specialization: form.specialization,
        bio: form.bio,
        photo: form.photo,
    };

    match update_profile(&state.store, user.id, update).await {
        Ok(name) => {
            session.rename(&name)?;
            session.flash_success("Profile updated")?;
            Ok(redirect("/profile"))
        }
        Err(err) => back_to_form(&session, err, "/profile"),
    }
}
