use std::sync::Arc;
use vidconv_core::{Config, ConversionService, MediaToolchain};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    converter: ConversionService<dyn MediaToolchain>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(config: Config, toolchain: Arc<dyn MediaToolchain>) -> Self {
        let converter = ConversionService::from_shared(toolchain, &config.converter);
        let ws_broadcaster = WsBroadcaster::new(config.progress.broadcast_capacity);
        Self {
            config,
            converter,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn converter(&self) -> &ConversionService<dyn MediaToolchain> {
        &self.converter
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
