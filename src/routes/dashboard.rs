use actix_web::{web, HttpResponse, Result};
use askama::Template;

use crate::{
    dashboard::{stats_for_doctor, stats_for_patient},
    error::AppError,
    models::{AppointmentStats, Role},
    session::SessionContext,
    state::AppState,
    templates::{render, Chrome},
};

#[derive(Clone, Debug)]
struct StatCard {
    label: &'static str,
    value: i64,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    chrome: Chrome,
    heading: &'static str,
    stats: Vec<StatCard>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboard").route(web::get().to(dashboard)));
}

async fn dashboard(state: web::Data<AppState>, session: SessionContext) -> Result<HttpResponse, AppError> {
    let user = session.require_role(None)?;
    let (heading, stats) = match user.role {
        Role::Patient => ("Your appointments", stats_for_patient(&state.store, user.id).await?),
        Role::Doctor => ("Your patient queue", stats_for_doctor(&state.store, user.id).await?),
    };

    Ok(render(DashboardTemplate {
        chrome: Chrome::from_session(&session),
        heading,
        stats: stat_cards(stats),
    }))
}

fn stat_cards(stats: AppointmentStats) -> Vec<StatCard> {
    vec![
        StatCard {
            label: "Pending",
            value: stats.pending,
        },
        StatCard {
            label: "Confirmed",
            value: stats.confirmed,
        },
        StatCard {
            label: "Completed",
            value: stats.completed,
        },
    ]
}
