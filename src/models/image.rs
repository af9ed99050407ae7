use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImageGenError;

pub const MIN_IMAGES: usize = 1;
pub const MAX_IMAGES: usize = 5;
pub const DEFAULT_IMAGES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1024x1536")]
    Portrait,
    #[serde(rename = "1536x1024")]
    Landscape,
}

impl ImageSize {
    pub const ALL: [ImageSize; 2] = [ImageSize::Portrait, ImageSize::Landscape];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Portrait => "1024x1536",
            ImageSize::Landscape => "1536x1024",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImageSize::Portrait => "Portrait (2:3)",
            ImageSize::Landscape => "Landscape (3:2)",
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageSize::Portrait => (1024, 1536),
            ImageSize::Landscape => (1536, 1024),
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = ImageGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageSize::ALL
            .into_iter()
            .find(|size| size.as_str() == s.trim())
            .ok_or_else(|| {
                let valid: Vec<&str> = ImageSize::ALL.iter().map(|s| s.as_str()).collect();
                ImageGenError::validation(
                    "size",
                    format!("unsupported size '{}', expected one of: {}", s, valid.join(", ")),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageModel {
    #[default]
    #[serde(rename = "sora_image")]
    Sora,
    #[serde(rename = "gpt-image-1")]
    GptImage1,
}

impl ImageModel {
    pub const ALL: [ImageModel; 2] = [ImageModel::Sora, ImageModel::GptImage1];

    pub fn id(&self) -> &'static str {
        match self {
            ImageModel::Sora => "sora_image",
            ImageModel::GptImage1 => "gpt-image-1",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ImageModel::Sora => "Sora",
            ImageModel::GptImage1 => "GPT-4o",
        }
    }

    /// (id, name) pairs for listing in a frontend.
    pub fn supported_models() -> Vec<(&'static str, &'static str)> {
        ImageModel::ALL
            .iter()
            .map(|m| (m.id(), m.display_name()))
            .collect()
    }
}

impl fmt::Display for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ImageModel {
    type Err = ImageGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageModel::ALL
            .into_iter()
            .find(|model| model.id() == s.trim())
            .ok_or_else(|| {
                let valid: Vec<&str> = ImageModel::ALL.iter().map(|m| m.id()).collect();
                ImageGenError::validation(
                    "model",
                    format!("unsupported model '{}', expected one of: {}", s, valid.join(", ")),
                )
            })
    }
}

/// One user submission. Frozen once handed to a coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub count: usize,
    pub size: ImageSize,
    pub model: ImageModel,
    pub api_key: String,
    pub api_url: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            count: DEFAULT_IMAGES,
            size: ImageSize::default(),
            model: ImageModel::default(),
            api_key: String::new(),
            api_url: crate::config::DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_model(mut self, model: ImageModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self.api_url = api_url.into();
        self
    }
}

/// Body POSTed to the images endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ImagesApiRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub background: &'static str,
    pub moderation: &'static str,
    pub output_format: &'static str,
    pub quality: &'static str,
    pub style: &'static str,
    pub output_compression: u8,
    pub response_format: &'static str,
}

impl ImagesApiRequest {
    pub fn new(prompt: &str, size: ImageSize, model: ImageModel) -> Self {
        Self {
            model: model.id().to_string(),
            prompt: prompt.to_string(),
            n: 1,
            size: size.as_str().to_string(),
            background: "opaque",
            moderation: "auto",
            output_format: "png",
            quality: "high",
            style: "natural",
            output_compression: 100,
            response_format: "b64_json",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImagesApiResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
pub struct ImageData {
    pub b64_json: Option<String>,
}

impl ImagesApiResponse {
    pub fn first_b64(self) -> Option<String> {
        self.data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .filter(|b64| !b64.is_empty())
    }
}
