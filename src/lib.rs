// Core modules
pub mod api;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod performance;
pub mod persistence;
pub mod risk;
pub mod settings;
pub mod strategy;
pub mod telemetry;

// Re-export commonly used types
pub use error::EngineError;
pub use models::*;
pub use orchestrator::{AssetSpec, Orchestrator, OrchestratorHandle, OrchestratorReport};
pub use settings::EngineConfig;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
