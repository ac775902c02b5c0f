mod appointments;
mod auth;
mod config;
mod dashboard;
mod db;
mod doctors;
mod error;
mod models;
mod profile;
mod routes;
mod session;
mod state;
mod templates;
#[cfg(test)]
mod test_support;

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};

use crate::{
    auth::AdminAccount,
    config::Config,
    db::Store,
    error::AppError,
    session::{session_key, session_middleware, SqliteSessionStore},
    state::AppState,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let mut config = Config::from_env();
    db::ensure_sqlite_dir(&config.database_url)?;
    db::ensure_sqlite_dir(&config.session_database_url)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Store::connect(&config.database_url).await?;
    store.reseed_if_needed(&config).await?;
    store.seed_defaults(&config).await?;

    let sessions = SqliteSessionStore::connect(&config.session_database_url).await?;
    let purged = sessions.purge_expired().await?;
    if purged > 0 {
        log::info!("Purged {purged} expired session(s)");
    }

    // The plain-text password is not kept past startup.
    let admin = match config.admin_password.take() {
        Some(password) => Some(AdminAccount::new(&config.admin_user, &password).map_err(AppError::from)?),
        None => None,
    };

    let key = session_key(config.session_secret.take().as_deref());
    let cookie_secure = config.cookie_secure;
    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(store, sessions, config, admin);
    log::info!("Starting Hospital Desk on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(session_middleware(state.sessions.clone(), key.clone(), cookie_secure))
            .wrap(middleware::Logger::default())
            .service(Files::new("/static", "./static").prefer_utf8(true))
            .configure(routes::configure)
            .default_service(web::to(routes::public::not_found))
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
