//! Pre-dispatch checks on user input. Everything here runs before a batch
//! is accepted; the coordinator assumes a validated request.

use reqwest::Url;

use crate::error::{ImageGenError, Result};
use crate::models::{GenerationRequest, MAX_IMAGES, MIN_IMAGES};

pub const API_KEY_MIN_LENGTH: usize = 8;
pub const PROMPT_MIN_LENGTH: usize = 5;
pub const PROMPT_MAX_LENGTH: usize = 2000;

const PLACEHOLDER_KEYS: [&str; 4] = ["your-api-key-here", "test", "demo", "example"];

pub fn validate_api_key(api_key: &str) -> Result<()> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(ImageGenError::validation("api_key", "please enter an API key"));
    }
    if key.chars().count() < API_KEY_MIN_LENGTH {
        return Err(ImageGenError::validation(
            "api_key",
            format!("API key must be at least {} characters", API_KEY_MIN_LENGTH),
        ));
    }
    if PLACEHOLDER_KEYS.iter().any(|p| key.eq_ignore_ascii_case(p)) {
        return Err(ImageGenError::validation("api_key", "API key is invalid or a placeholder"));
    }
    Ok(())
}

pub fn validate_prompt(prompt: &str) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ImageGenError::validation("prompt", "please describe the image"));
    }
    let len = prompt.chars().count();
    if len < PROMPT_MIN_LENGTH {
        return Err(ImageGenError::validation(
            "prompt",
            format!("prompt must be at least {} characters", PROMPT_MIN_LENGTH),
        ));
    }
    if len > PROMPT_MAX_LENGTH {
        return Err(ImageGenError::validation(
            "prompt",
            format!("prompt must not exceed {} characters", PROMPT_MAX_LENGTH),
        ));
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ImageGenError::validation("api_url", "URL must not be empty"));
    }
    let scheme_ok = (url.starts_with("http://") && url.len() > "http://".len())
        || (url.starts_with("https://") && url.len() > "https://".len());
    if !scheme_ok {
        return Err(ImageGenError::validation("api_url", "URL must start with http:// or https://"));
    }
    let parsed = Url::parse(url)
        .map_err(|e| ImageGenError::validation("api_url", format!("invalid URL: {}", e)))?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ImageGenError::validation("api_url", "URL is missing a host")),
    }
}

pub fn validate_count(count: usize) -> Result<()> {
    if !(MIN_IMAGES..=MAX_IMAGES).contains(&count) {
        return Err(ImageGenError::validation(
            "count",
            format!("image count must be between {} and {}", MIN_IMAGES, MAX_IMAGES),
        ));
    }
    Ok(())
}

pub fn validate_request(request: &GenerationRequest) -> Result<()> {
    validate_api_key(&request.api_key)?;
    validate_url(&request.api_url)?;
    validate_prompt(&request.prompt)?;
    validate_count(request.count)
}
