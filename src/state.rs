use std::sync::Arc;

use crate::{auth::AdminAccount, config::Config, db::Store, session::SqliteSessionStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sessions: SqliteSessionStore,
    pub config: Arc<Config>,
    pub admin: Option<AdminAccount>,
}

impl AppState {
    pub fn new(
        store: Store,
        sessions: SqliteSessionStore,
        config: Config,
        admin: Option<AdminAccount>,
    ) -> Self {
        Self {
            store,
            sessions,
            config: Arc::new(config),
            admin,
        }
    }
}
