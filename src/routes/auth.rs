use actix_web::{web, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{login, register, Registration},
    error::AppError,
    models::Role,
    routes::{back_to_form, redirect},
    session::SessionContext,
    state::AppState,
    templates::{render, Chrome},
};

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    chrome: Chrome,
    doctor_hint: bool,
    domain: String,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    chrome: Chrome,
    is_doctor: bool,
    action: &'static str,
    domain: String,
}

#[derive(Deserialize)]
struct LoginQuery {
    role: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterForm {
    name: String,
    email: String,
    password: String,
    specialization: Option<String>,
    bio: Option<String>,
}

const PATIENT_FORM: &str = "/auth/register/patient";
const DOCTOR_FORM: &str = "/auth/register/doctor";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .route(web::get().to(show_login))
                    .route(web::post().to(submit_login)),
            )
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(
                web::resource("/register/patient")
                    .route(web::get().to(show_register_patient))
                    .route(web::post().to(submit_register_patient)),
            )
            .service(
                web::resource("/register/doctor")
                    .route(web::get().to(show_register_doctor))
                    .route(web::post().to(submit_register_doctor)),
            ),
    );
}

/// Signed-in visitors have no business on the login or sign-up pages.
fn guest_only(session: &SessionContext) -> Option<HttpResponse> {
    session.user().map(|_| redirect("/dashboard"))
}

async fn show_login(
    state: web::Data<AppState>,
    session: SessionContext,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    if let Some(response) = guest_only(&session) {
        return response;
    }
    render(LoginTemplate {
        chrome: Chrome::from_session(&session),
        doctor_hint: query.role.as_deref() == Some(Role::Doctor.as_str()),
        domain: state.config.doctor_domain.clone(),
    })
}

async fn submit_login(
    state: web::Data<AppState>,
    session: SessionContext,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    if let Some(response) = guest_only(&session) {
        return Ok(response);
    }
    let form = form.into_inner();
    match login(&state.store, &form.email, &form.password).await {
        Ok(user) => {
            session.flash_success(format!("Welcome {}", user.name))?;
            session.sign_in(user)?;
            Ok(redirect("/dashboard"))
        }
        Err(err) => back_to_form(&session, err, "/auth/login"),
    }
}

async fn logout(session: SessionContext) -> HttpResponse {
    session.sign_out();
    redirect("/")
}

async fn show_register_patient(state: web::Data<AppState>, session: SessionContext) -> HttpResponse {
    show_register(&state, &session, Role::Patient)
}

async fn show_register_doctor(state: web::Data<AppState>, session: SessionContext) -> HttpResponse {
    show_register(&state, &session, Role::Doctor)
}

fn show_register(state: &AppState, session: &SessionContext, role: Role) -> HttpResponse {
    if let Some(response) = guest_only(session) {
        return response;
    }
    render(RegisterTemplate {
        chrome: Chrome::from_session(session),
        is_doctor: role == Role::Doctor,
        action: form_path(role),
        domain: state.config.doctor_domain.clone(),
    })
}

async fn submit_register_patient(
    state: web::Data<AppState>,
    session: SessionContext,
    form: web::Form<RegisterForm>,
) -> Result<HttpResponse, AppError> {
    submit_register(&state, &session, Role::Patient, form.into_inner()).await
}

async fn submit_register_doctor(
    state: web::Data<AppState>,
    session: SessionContext,
    form: web::Form<RegisterForm>,
) -> Result<HttpResponse, AppError> {
    submit_register(&state, &session, Role::Doctor, form.into_inner()).await
}

async fn submit_register(
    state: &AppState,
    session: &SessionContext,
    role: Role,
    form: RegisterForm,
) -> Result<HttpResponse, AppError> {
    if let Some(response) = guest_only(session) {
        return Ok(response);
    }
    let input = Registration {
        role,
        name: form.name,
        email: form.email,
        password: form.password,
        specialization: form.specialization,
        bio: form.bio,
    };
    match register(&state.store, &state.config, input).await {
        Ok(_) => {
            session.flash_success(match role {
                Role::Patient => "Registration successful. Please log in.",
                Role::Doctor => "Doctor registered. Please log in.",
            })?;
            Ok(redirect("/auth/login"))
        }
        Err(err) => back_to_form(session, err, form_path(role)),
    }
}

fn form_path(role: Role) -> &'static str {
    match role {
        Role::Patient => PATIENT_FORM,
        Role::Doctor => DOCTOR_FORM,
    }
}
