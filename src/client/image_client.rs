use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::json;

use crate::{
    client::ImageGenerator,
    config::AppConfig,
    error::{ImageGenError, Result},
    models::{GenerationRequest, ImageModel, ImageSize, ImagesApiRequest, ImagesApiResponse},
};

const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct GenerationClient {
    http: Client,
    api_key: String,
    api_url: String,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageGenError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            api_url: api_url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ImageGenError::Config("API key is not configured".into()))?;
        Self::new(api_key, config.api_url(), config.timeout)
    }

    pub fn from_request(request: &GenerationRequest, timeout: Duration) -> Result<Self> {
        Self::new(request.api_key.clone(), request.api_url.clone(), timeout)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn generate(&self, prompt: &str, size: ImageSize, model: ImageModel) -> Result<String> {
        let body = ImagesApiRequest::new(prompt, size, model);

        log::info!("Generating image with model: {} ({})", model, size);
        log::debug!("POST {} timeout={:?}", self.api_url, self.timeout);
        let timer = crate::logger::timer("image generation");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        timer.stop();
        log::debug!("Response status: {}", status);

        if status != StatusCode::OK {
            log::error!("API request failed: {} - {}", status, text);
            return Err(ImageGenError::from_status(status.as_u16(), &text));
        }

        let parsed: ImagesApiResponse = serde_json::from_str(&text)
            .map_err(|e| ImageGenError::InvalidResponse(format!("unparsable body: {}", e)))?;

        let b64 = parsed
            .first_b64()
            .ok_or_else(|| ImageGenError::InvalidResponse("no image data in response".into()))?;

        log::debug!("Image payload length: {} chars", b64.len());
        Ok(b64)
    }

    /// Probes the endpoint with a minimal request. Any protocol-level answer
    /// (200/400/401/429) counts as reachable.
    pub async fn check_connection(&self) -> Result<bool> {
        let probe = json!({
            "model": "dall-e-3",
            "prompt": "test",
            "n": 1,
            "size": "1024x1024"
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&probe)
            .timeout(CONNECTION_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ImageGenError::Timeout(CONNECTION_CHECK_TIMEOUT)
                } else {
                    ImageGenError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        log::info!("Connection check returned HTTP {}", status);
        Ok(matches!(status, 200 | 400 | 401 | 429))
    }

    fn transport_error(&self, err: reqwest::Error) -> ImageGenError {
        if err.is_timeout() {
            log::warn!("API request timed out after {:?}", self.timeout);
            ImageGenError::Timeout(self.timeout)
        } else if err.is_connect() {
            log::error!("Connection failed: {}", err);
            ImageGenError::Network(format!("connection failed: {}", err))
        } else {
            log::error!("Transport error: {}", err);
            ImageGenError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ImageGenerator for GenerationClient {
    async fn generate(&self, prompt: &str, size: ImageSize, model: ImageModel) -> Result<String> {
        GenerationClient::generate(self, prompt, size, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;

    const KEY: &str = "sk-test-key-123";

    async fn ok_handler(headers: HeaderMap, Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk-test-key-123");
        let well_formed = body["n"] == 1
            && body["response_format"] == "b64_json"
            && body["output_format"] == "png";

        if authorized && well_formed {
            (AxumStatus::OK, Json(json!({"data": [{"b64_json": "aGVsbG8="}]})))
        } else {
            (AxumStatus::UNAUTHORIZED, Json(json!({"error": "rejected"})))
        }
    }

    async fn stub_server() -> String {
        let router = Router::new()
            .route("/ok", post(ok_handler))
            .route("/empty", post(|| async { Json(json!({"data": []})) }))
            .route("/garbage", post(|| async { "definitely not json" }))
            .route(
                "/limited",
                post(|| async { (AxumStatus::TOO_MANY_REQUESTS, "slow down") }),
            )
            .route(
                "/broken",
                post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "") }),
            )
            .route(
                "/slow",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({"data": [{"b64_json": "aGVsbG8="}]}))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str, path: &str, timeout: Duration) -> GenerationClient {
        GenerationClient::new(KEY, format!("{}{}", base, path), timeout).unwrap()
    }

    #[tokio::test]
    async fn success_returns_payload() {
        let base = stub_server().await;
        let result = client(&base, "/ok", Duration::from_secs(5))
            .generate("a cat", ImageSize::Portrait, ImageModel::Sora)
            .await;
        assert_eq!(result.unwrap(), "aGVsbG8=");
    }

    #[tokio::test]
    async fn wrong_key_maps_to_api_error() {
        let base = stub_server().await;
        let client = GenerationClient::new("sk-wrong-key", format!("{}/ok", base), Duration::from_secs(5)).unwrap();
        match client.generate("a cat", ImageSize::Portrait, ImageModel::Sora).await {
            Err(ImageGenError::Api { status, .. }) => assert_eq!(status, 401),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn ok_status_without_image_is_invalid_response() {
        let base = stub_server().await;
        for path in ["/empty", "/garbage"] {
            let result = client(&base, path, Duration::from_secs(5))
                .generate("a cat", ImageSize::Landscape, ImageModel::GptImage1)
                .await;
            assert!(
                matches!(result, Err(ImageGenError::InvalidResponse(_))),
                "{} gave {:?}",
                path,
                result
            );
        }
    }

    #[tokio::test]
    async fn non_200_maps_to_api_error() {
        let base = stub_server().await;
        match client(&base, "/limited", Duration::from_secs(5))
            .generate("a cat", ImageSize::Portrait, ImageModel::Sora)
            .await
        {
            Err(ImageGenError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert!(message.contains("rate limited"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        match client(&base, "/broken", Duration::from_secs(5))
            .generate("a cat", ImageSize::Portrait, ImageModel::Sora)
            .await
        {
            Err(ImageGenError::Api { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let base = stub_server().await;
        let timeout = Duration::from_millis(200);
        match client(&base, "/slow", timeout)
            .generate("a cat", ImageSize::Portrait, ImageModel::Sora)
            .await
        {
            Err(ImageGenError::Timeout(d)) => assert_eq!(d, timeout),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GenerationClient::new(KEY, format!("http://{}/gen", addr), Duration::from_secs(5)).unwrap();
        let result = client.generate("a cat", ImageSize::Portrait, ImageModel::Sora).await;
        assert!(matches!(result, Err(ImageGenError::Network(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn connection_check_accepts_protocol_answers() {
        let base = stub_server().await;
        assert!(client(&base, "/limited", Duration::from_secs(5)).check_connection().await.unwrap());
        assert!(!client(&base, "/missing", Duration::from_secs(5)).check_connection().await.unwrap());
    }

    #[test]
    fn from_config_requires_key() {
        assert!(matches!(
            GenerationClient::from_config(&AppConfig::new()),
            Err(ImageGenError::Config(_))
        ));
        let client = GenerationClient::from_config(&AppConfig::new().with_api_key(KEY)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(300));
        assert_eq!(client.api_url(), crate::config::DEFAULT_API_URL);
    }
}
