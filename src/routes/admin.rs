use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{
    auth::{admin_validator, AdminIdentity},
    error::AppError,
    routes::redirect,
    session::SessionContext,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/reset").route(web::post().to(reset))),
    );
}

/// Wipes all users and appointments and restores the built-in doctors.
async fn reset(
    state: web::Data<AppState>,
    session: SessionContext,
    operator: web::ReqData<AdminIdentity>,
) -> Result<HttpResponse, AppError> {
    state.store.force_reseed(&state.config).await?;
    log::warn!("Database reset by operator {}", operator.username);

    session.flash_success("Database reset. Seeded built-in doctors.")?;
    Ok(redirect("/doctors"))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::{header, StatusCode},
        test,
    };

    use crate::{
        db::BUILT_IN_DOCTORS,
        models::Role,
        routes::testing::{body_text, location, session_cookie, test_app},
        test_support::{insert_appointment, insert_user, test_state},
    };

    // base64("admin:operator-secret")
    const OPERATOR: &str = "Basic YWRtaW46b3BlcmF0b3Itc2VjcmV0";
    // base64("admin:wrong")
    const WRONG: &str = "Basic YWRtaW46d3Jvbmc=";

    #[actix_web::test]
    async fn reset_requires_operator_credentials() {
        let state = test_state().await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        let app = test::init_service(test_app(state.clone())).await;

        let res = test::call_service(&app, test::TestRequest::post().uri("/admin/reset").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/reset")
                .insert_header((header::AUTHORIZATION, WRONG))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(patient)
            .fetch_one(state.store.pool())
            .await
            .expect("count");
        assert_eq!(remaining, 1);
    }

    #[actix_web::test]
    async fn reset_restores_built_in_doctors() {
        let state = test_state().await;
        let doctor = insert_user(&state.store, Role::Doctor, "Dr. Temp", "temp@hosp.test", Some("Dentist")).await;
        let patient = insert_user(&state.store, Role::Patient, "Pat", "pat@example.com", None).await;
        insert_appointment(&state.store, patient, doctor, "pending").await;
        let app = test::init_service(test_app(state.clone())).await;

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/reset")
                .insert_header((header::AUTHORIZATION, OPERATOR))
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/doctors"));
        let cookie = session_cookie(&res).expect("flash session");

        let (users, appointments) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM appointments)",
        )
        .fetch_one(state.store.pool())
        .await
        .expect("counts");
        assert_eq!(users, BUILT_IN_DOCTORS.len() as i64);
        assert_eq!(appointments, 0);

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/doctors").cookie(cookie).to_request(),
        )
        .await;
        let body = body_text(res).await;
        assert!(body.contains("Database reset. Seeded built-in doctors."));
        assert!(!body.contains("Dr. Temp"));
    }

    #[actix_web::test]
    async fn reset_is_disabled_without_operator_account() {
        let mut state = test_state().await;
        state.admin = None;
        let app = test::init_service(test_app(state)).await;

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/admin/reset")
                .insert_header((header::AUTHORIZATION, OPERATOR))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
