use std::sync::Arc;

use db::Stores;
use services::services::Services;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(stores: Stores, config: ServerConfig) -> Self {
        Self {
            services: Services::new(stores, config.services.clone()),
            config: Arc::new(config),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
