use crate::common::AppConfig;
use crate::session::Session;
use std::sync::Arc;

/// Application state passed to all handlers via Axum State extractor
#[derive(Clone)]
pub struct AppState {
    pub session: Session,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(session: Session, config: AppConfig) -> Self {
        Self {
            session,
            config: Arc::new(config),
        }
    }
}
