pub mod image_client;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ImageModel, ImageSize};

pub use image_client::GenerationClient;

/// One image-generation call. Implementations must be shareable across
/// worker tasks; the coordinator calls them concurrently.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the base64 payload of a single generated image.
    async fn generate(&self, prompt: &str, size: ImageSize, model: ImageModel) -> Result<String>;

    /// Entry point used by the batch coordinator; `index` is the slot being
    /// filled. Defaults to `generate`.
    async fn generate_slot(
        &self,
        index: usize,
        prompt: &str,
        size: ImageSize,
        model: ImageModel,
    ) -> Result<String> {
        log::debug!("Dispatching generation for slot {}", index);
        self.generate(prompt, size, model).await
    }
}
