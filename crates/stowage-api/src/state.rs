//! Shared handler state.

use stowage_core::Config;
use stowage_services::StowageServices;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub services: StowageServices,
}

impl AppState {
    pub fn new(config: Config, services: StowageServices) -> Self {
        Self { config, services }
    }
}
