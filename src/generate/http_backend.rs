//! HTTP generator for llama.cpp / Ollama style servers

use super::{build_prompt, GenerationOutcome, Generator};
use crate::config::{parse_base_url, GeneratorConfig};
use crate::context::ContextPayload;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Sends `POST {url}/api/generate` with `stream: false` and reads `response`
pub struct HttpGenerator {
    client: Client,
    base_url: Url,
    model: String,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl HttpGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.url)?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
            max_retries: config.max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Base delay between attempts; doubles after each failure
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Whether the server answers its model listing
    pub async fn health_check(&self) -> bool {
        let Ok(url) = self.base_url.join("api/tags") else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = backoff_delay(self.backoff, attempt);
                        warn!(
                            "Generation failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Other("generation never attempted".to_string())))
    }

    async fn send_once(&self, endpoint: &Url, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!("HTTP {} - {}", status, body.trim())));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.classify(e))?;
        Ok(parsed.response)
    }

    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout.as_millis() as u64)
        } else {
            Error::Http(err)
        }
    }
}

/// `base * 2^attempt`, saturating instead of overflowing
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, payload: &ContextPayload) -> GenerationOutcome {
        let endpoint = match self.base_url.join("api/generate") {
            Ok(url) => url,
            Err(e) => return GenerationOutcome::Unavailable(format!("Invalid generator URL: {}", e)),
        };
        let prompt = build_prompt(payload);

        info!("Generating answer with model: {}", self.model);

        match self.retry_request(|| self.send_once(&endpoint, &prompt)).await {
            Ok(text) if !text.trim().is_empty() => GenerationOutcome::Generated(text.trim().to_string()),
            Ok(_) => GenerationOutcome::Unavailable("Generator returned an empty response".to_string()),
            Err(e) => {
                warn!("Generation unavailable: {}", e);
                GenerationOutcome::Unavailable(format!("Generation failed: {}", e))
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
