pub mod entity;
pub mod env;
pub mod tracing_init;

pub use entity::EntityDefinition;
pub use env::{AppConfig, WatermarkBackend};
pub use tracing_init::init_tracing;
