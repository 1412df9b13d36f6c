// src/config/mod.rs
pub mod ai;
pub mod sources;

pub use crate::ingest::config::{load_pipeline_config_default, PipelineConfig};
pub use ai::{load_ai_config, AiConfig};
pub use sources::FileSourceRegistry;
