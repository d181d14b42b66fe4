pub mod config;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod service;
pub mod telemetry;
pub mod ui;

pub use config::Config;
pub use service::{AppState, build_router, create_app};
