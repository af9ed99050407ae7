pub mod batch;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod validation;

pub use batch::{BatchCoordinator, BatchEvent, BatchHandle, BatchObserver, BatchSummary, GeneratorFactory};
pub use client::{GenerationClient, ImageGenerator};
pub use config::AppConfig;
pub use error::{ImageGenError, Result};
pub use models::*;
