pub mod config;
pub mod errors;

pub use config::{AppConfig, ConfigOverrides};
pub use errors::AppError;
