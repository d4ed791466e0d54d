use std::sync::Arc;

use crate::config::Config;
use crate::llm::AiGateway;
use crate::media::TempFileStore;
use crate::pipeline::{MediaPipeline, PipelineOptions};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub pipeline: MediaPipeline,
}

impl AppState {
    pub fn new(config: &Config, gateway: Arc<dyn AiGateway>) -> Self {
        let sessions = SessionStore::new();
        let pipeline = MediaPipeline::new(
            sessions.clone(),
            gateway,
            TempFileStore::new(config.media_temp_dir.clone()),
            PipelineOptions::from_config(config),
        );
        AppState { sessions, pipeline }
    }
}
