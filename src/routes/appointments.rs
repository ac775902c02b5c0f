use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    appointments::{
        create_appointment, list_for_doctor, list_for_patient, update_status, AppointmentRequest,
        StatusUpdate,
    },
    doctors::get_doctor,
    error::AppError,
    models::{AppointmentStatus, Doctor, DoctorAppointmentRow, PatientAppointmentRow, Role},
    routes::{back_to_form, redirect},
    session::SessionContext,
    state::AppState,
    templates::{render, Chrome},
};

#[derive(Clone, Debug)]
struct AppointmentView {
    id: i64,
    date: String,
    time: String,
    concern: String,
    status: String,
    counterpart: String,
    counterpart_link: String,
    has_link: bool,
    requested_on: String,
    detail: String,
    has_detail: bool,
    diagnosis: String,
    has_diagnosis: bool,
    doctor_comment: String,
    has_comment: bool,
    status_options: Vec<StatusOption>,
}

#[derive(Clone, Debug)]
struct StatusOption {
    value: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "book.html")]
struct BookTemplate {
    chrome: Chrome,
    doctor: Doctor,
}

#[derive(Template)]
#[template(path = "my_appointments.html")]
struct MyAppointmentsTemplate {
    chrome: Chrome,
    appointments: Vec<AppointmentView>,
}

#[derive(Template)]
#[template(path = "doctor_appointments.html")]
struct DoctorAppointmentsTemplate {
    chrome: Chrome,
    appointments: Vec<AppointmentView>,
}

#[derive(Deserialize)]
struct BookingForm {
    doctor_id: String,
    date: String,
    time: String,
    concern: String,
}

#[derive(Deserialize)]
struct AppointmentStatusForm {
    status: String,
    diagnosis: Option<String>,
    doctor_comment: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/appointments")
            .service(web::resource("/new/{doctor_id}").route(web::get().to(new_appointment)))
            .service(web::resource("/create").route(web::post().to(create)))
            .service(web::resource("/mine").route(web::get().to(mine)))
            .service(web::resource("/doctor").route(web::get().to(doctor_queue)))
            .service(
                web::resource("/{id}/status")
                    .route(web::post().to(set_status)),
            ),
    );
}

async fn new_appointment(
    state: web::Data<AppState>,
    session: SessionContext,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    session.require_role(Some(Role::Patient))?;
    let doctor_id = path.trim().parse::<i64>().map_err(|_| AppError::NotFound)?;
    let doctor = get_doctor(&state.store, doctor_id).await?;

    Ok(render(BookTemplate {
        chrome: Chrome::from_session(&session),
        doctor,
    }))
}

async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    session: SessionContext,
    form: web::Form<BookingForm>,
) -> Result<HttpResponse, AppError> {
    let user = session.require_role(Some(Role::Patient))?;
    let form = form.into_inner();
    let request = AppointmentRequest {
        doctor_id: form.doctor_id,
        date: form.date,
        time: form.time,
        concern: form.concern,
    };

    match create_appointment(&state.store, user.id, &request).await {
        Ok(_) => {
            session.flash_success("Appointment requested")?;
            Ok(redirect("/appointments/mine"))
        }
        Err(AppError::InvalidDoctor) => back_to_form(&session, AppError::InvalidDoctor, "/doctors"),
        Err(err) => back_to_form(&session, err, &booking_form_location(&req, &request.doctor_id)),
    }
}

/// The booking page the form was posted from. Only a path under
/// `/appointments/new/` is taken from the referrer.
fn booking_form_location(req: &HttpRequest, doctor_id: &str) -> String {
    req.headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| {
            referer
                .find("/appointments/new/")
                .and_then(|at| referer.get(at..))
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("/appointments/new/{}", doctor_id.trim()))
}

async fn mine(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse, AppError> {
    let user = session.require_role(Some(Role::Patient))?;
    let rows = list_for_patient(&state.store, user.id).await?;

    Ok(render(MyAppointmentsTemplate {
        chrome: Chrome::from_session(&session),
        appointments: rows.into_iter().map(patient_view).collect(),
    }))
}

async fn doctor_queue(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse, AppError> {
    let user = session.require_role(Some(Role::Doctor))?;
    let rows = list_for_doctor(&state.store, user.id).await?;

    Ok(render(DoctorAppointmentsTemplate {
        chrome: Chrome::from_session(&session),
        appointments: rows.into_iter().map(doctor_view).collect(),
    }))
}

async fn set_status(
    state: web::Data<AppState>,
    session: SessionContext,
    path: web::Path<String>,
    form: web::Form<AppointmentStatusForm>,
) -> Result<HttpResponse, AppError> {
    let user = session.require_role(Some(Role::Doctor))?;
    let appointment_id = path.trim().parse::<i64>().map_err(|_| AppError::NotFound)?;
    let form = form.into_inner();
    let update = StatusUpdate {
        status: form.status,
        diagnosis: form.diagnosis,
        doctor_comment: form.doctor_comment,
    };

    match update_status(&state.store, appointment_id, user.id, update).await {
        Ok(()) => {
            session.flash_success("Status updated")?;
            Ok(redirect("/appointments/doctor"))
        }
        Err(err) => back_to_form(&session, err, "/appointments/doctor"),
    }
}

fn patient_view(row: PatientAppointmentRow) -> AppointmentView {
    let detail = row.specialization.unwrap_or_default();
    let diagnosis = row.diagnosis.unwrap_or_default();
    let doctor_comment = row.doctor_comment.unwrap_or_default();
    AppointmentView {
        id: row.id,
        date: row.appt_date,
        time: row.appt_time,
        concern: row.concern,
        status: row.status,
        counterpart: row.doctor_name,
        counterpart_link: format!("/doctors/{}", row.doctor_id),
        has_link: true,
        requested_on: requested_on(&row.created_at),
        has_detail: !detail.trim().is_empty(),
        detail,
        has_diagnosis: !diagnosis.trim().is_empty(),
        diagnosis,
        has_comment: !doctor_comment.trim().is_empty(),
        doctor_comment,
        status_options: Vec::new(),
    }
}

fn doctor_view(row: DoctorAppointmentRow) -> AppointmentView {
    let diagnosis = row.diagnosis.unwrap_or_default();
    let doctor_comment = row.doctor_comment.unwrap_or_default();
    AppointmentView {
        id: row.id,
        date: row.appt_date,
        time: row.appt_time,
        concern: row.concern,
        status_options: status_options(&row.status),
        status: row.status,
        counterpart: row.patient_name,
        counterpart_link: String::new(),
        has_link: false,
        requested_on: requested_on(&row.created_at),
        has_detail: !row.patient_email.trim().is_empty(),
        detail: row.patient_email,
        has_diagnosis: !diagnosis.trim().is_empty(),
        diagnosis,
        has_comment: !doctor_comment.trim().is_empty(),
        doctor_comment,
    }
}

/// Date part of an RFC 3339 timestamp.
fn requested_on(created_at: &str) -> String {
    created_at.get(..10).unwrap_or(created_at).to_string()
}

fn status_options(current: &str) -> Vec<StatusOption> {
    AppointmentStatus::ALL
        .into_iter()
        .map(|status| StatusOption {
            value: status.as_str(),
            selected: status.as_str() == current,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use actix_web::{
        cookie::Cookie,
        dev::ServiceResponse,
        http::{header, StatusCode},
        test,
    };

    use crate::{
        auth::hash_password,
        models::Role,
        routes::testing::{body_text, location, session_cookie, test_app},
        state::AppState,
        test_support::{insert_appointment, insert_user, test_state},
    };

    async fn set_password(state: &AppState, user_id: i64) {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash_password("secret12").expect("hash"))
            .bind(user_id)
            .execute(state.store.pool())
            .await
            .expect("set password");
    }

    fn login_as(email: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/auth/login")
            .set_form([("email", email), ("password", "secret12")])
    }

    fn signed_in(res: &ServiceResponse) -> Cookie<'static> {
        assert_eq!(location(res).as_deref(), Some("/dashboard"));
        session_cookie(res).expect("session cookie")
    }

    #[actix_web::test]
    async fn patient_books_and_doctor_confirms() {
        let state = test_state().await;
        let doctor = insert_user(&state.store, Role::Doctor, "Dr. X", "x@hosp.test", Some("Cardiologist")).await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        set_password(&state, doctor).await;
        set_password(&state, patient).await;
        let app = test::init_service(test_app(state.clone())).await;

        let pat = signed_in(&test::call_service(&app, login_as("pat@example.com").to_request()).await);
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/appointments/new/{doctor}"))
                .cookie(pat.clone())
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/appointments/create")
                .cookie(pat.clone())
                .set_form([
                    ("doctor_id", doctor.to_string().as_str()),
                    ("date", "2030-03-04"),
                    ("time", "11:00"),
                    ("concern", "Shortness of breath on stairs"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/appointments/mine"));

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/appointments/mine").cookie(pat.clone()).to_request(),
        )
        .await;
        let body = body_text(res).await;
        assert!(body.contains("Appointment requested"));
        assert!(body.contains("Shortness of breath on stairs"));
        assert!(body.contains("pending"));

        let appointment = sqlx::query_scalar::<_, i64>("SELECT id FROM appointments LIMIT 1")
            .fetch_one(state.store.pool())
            .await
            .expect("appointment");

        let doc = signed_in(&test::call_service(&app, login_as("x@hosp.test").to_request()).await);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/appointments/{appointment}/status"))
                .cookie(doc.clone())
                .set_form([("status", "confirmed"), ("diagnosis", ""), ("doctor_comment", "Bring reports")])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/appointments/doctor"));

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/appointments/doctor").cookie(doc).to_request(),
        )
        .await;
        let body = body_text(res).await;
        assert!(body.contains("Status updated"));
        assert!(body.contains("Bring reports"));
        assert!(body.contains("pat@example.com"));
    }

    #[actix_web::test]
    async fn booking_errors_redirect_to_the_right_place() {
        let state = test_state().await;
        let doctor = insert_user(&state.store, Role::Doctor, "Dr. X", "x@hosp.test", Some("Cardiologist")).await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        set_password(&state, patient).await;
        let app = test::init_service(test_app(state)).await;
        let pat = signed_in(&test::call_service(&app, login_as("pat@example.com").to_request()).await);

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/appointments/create")
                .cookie(pat.clone())
                .set_form([
                    ("doctor_id", doctor.to_string().as_str()),
                    ("date", "tomorrow"),
                    ("time", "11:00"),
                    ("concern", "Shortness of breath on stairs"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some(format!("/appointments/new/{doctor}").as_str()));

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/appointments/create")
                .cookie(pat.clone())
                .set_form([
                    ("doctor_id", "9999"),
                    ("date", "2030-03-04"),
                    ("time", "11:00"),
                    ("concern", "Shortness of breath on stairs"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/doctors"));
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/doctors").cookie(pat.clone()).to_request(),
        )
        .await;
        assert!(body_text(res).await.contains("Invalid doctor"));

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/appointments/new/9999").cookie(pat).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn malformed_doctor_id_goes_back_to_the_form() {
        let state = test_state().await;
        let doctor = insert_user(&state.store, Role::Doctor, "Dr. X", "x@hosp.test", Some("Cardiologist")).await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        set_password(&state, patient).await;
        let app = test::init_service(test_app(state)).await;
        let pat = signed_in(&test::call_service(&app, login_as("pat@example.com").to_request()).await);
        let form = format!("/appointments/new/{doctor}");

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/appointments/create")
                .cookie(pat.clone())
                .insert_header((header::REFERER, format!("http://localhost:8080{form}")))
                .set_form([
                    ("doctor_id", "abc"),
                    ("date", "2030-03-04"),
                    ("time", "11:00"),
                    ("concern", "Shortness of breath on stairs"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some(form.as_str()));

        let res = test::call_service(&app, test::TestRequest::get().uri(&form).cookie(pat.clone()).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_text(res).await;
        assert!(body.contains("Invalid value"));
        assert!(!body.contains("Invalid doctor"));

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/appointments/create")
                .cookie(pat)
                .insert_header((header::REFERER, "https://elsewhere.example/phish"))
                .set_form([
                    ("doctor_id", "abc"),
                    ("date", "2030-03-04"),
                    ("time", "11:00"),
                    ("concern", "Shortness of breath on stairs"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/appointments/new/abc"));
    }

    #[actix_web::test]
    async fn role_guards() {
        let state = test_state().await;
        let doctor = insert_user(&state.store, Role::Doctor, "Dr. X", "x@hosp.test", Some("Cardiologist")).await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        set_password(&state, patient).await;
        let appointment = insert_appointment(&state.store, patient, doctor, "pending").await;
        let app = test::init_service(test_app(state)).await;

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/appointments/mine").to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/auth/login"));

        let pat = signed_in(&test::call_service(&app, login_as("pat@example.com").to_request()).await);
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/appointments/doctor").cookie(pat.clone()).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/appointments/{appointment}/status"))
                .cookie(pat)
                .set_form([("status", "completed")])
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn foreign_appointment_update_is_not_found() {
        let state = test_state().await;
        let owner = insert_user(&state.store, Role::Doctor, "Dr. A", "a@hosp.test", Some("Cardiologist")).await;
        let stranger = insert_user(&state.store, Role::Doctor, "Dr. B", "b@hosp.test", Some("Dermatologist")).await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        set_password(&state, stranger).await;
        let appointment = insert_appointment(&state.store, patient, owner, "pending").await;
        let app = test::init_service(test_app(state)).await;

        let doc = signed_in(&test::call_service(&app, login_as("b@hosp.test").to_request()).await);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/appointments/{appointment}/status"))
                .cookie(doc)
                .set_form([("status", "completed")])
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
