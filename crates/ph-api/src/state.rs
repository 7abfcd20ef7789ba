use ph_core::Orchestrator;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config: AppConfig,
}
