pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod store;
pub mod workers;

pub use config::EngineConfig;
pub use engine::PracticeEngine;
pub use error::{EngineError, EngineResult};
