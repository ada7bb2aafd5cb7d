pub mod api;
pub mod calls;
pub mod entities;
pub mod gemini;
pub mod metrics;
pub mod migrator;
pub mod notifications;
pub mod pipeline;
pub mod scripts;
pub mod telemetry;

pub use redis;
pub use sea_orm;
