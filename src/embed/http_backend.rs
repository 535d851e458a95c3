use super::{validate_embeddings, Embedder};
use crate::config::{parse_base_url, EmbeddingConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbedTextRequest<'a> {
    model: &'a str,
    inputs: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingData> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
            EmbeddingResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// Embedder backed by a remote embedding server.
///
/// Sends `POST {url}/embed` with `{"model", "inputs"}` and accepts
/// `embeddings`, `vectors` or OpenAI-style `data[].embedding` responses.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model_id: String,
    dimension: usize,
    timeout: Duration,
    retries: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.url)?;
        let endpoint = base_url
            .join("embed")
            .map_err(|e| Error::Config(format!("Invalid embedding backend URL: {}", e)))?;
        let timeout = config.timeout();
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model_id: config.model.clone(),
            dimension: config.dimension,
            timeout,
            retries: 2,
        })
    }

    /// Override the number of retries after the first attempt
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout.as_millis() as u64)
        } else {
            Error::EmbeddingUnavailable(err.to_string())
        }
    }

    async fn send_once(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedTextRequest {
            model: &self.model_id,
            inputs,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let response = response.error_for_status().map_err(|e| self.classify(e))?;
        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.timeout.as_millis() as u64)
            } else {
                Error::EmbeddingUnavailable(format!("malformed embedding response: {}", e))
            }
        })?;

        Ok(parsed.into_embeddings())
    }

    async fn send_with_retry(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.retries {
            match self.send_once(inputs).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.retries + 1,
                        e
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::EmbeddingUnavailable("Embedding backend request failed".to_string())
        }))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts via {}", texts.len(), self.endpoint);
        let embeddings = self.send_with_retry(&texts).await?;
        validate_embeddings(&embeddings, texts.len(), self.dimension)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: "http".to_string(),
            url: url.to_string(),
            dimension,
            model: "test-model".to_string(),
            timeout_secs: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_embeds_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_partial_json(json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 3)).unwrap();
        let vectors = embedder
            .embed_batch(vec!["fire".to_string(), "flood".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.0, 1.0]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&format!("{}/v1", server.uri()), 2)).unwrap();
        assert_eq!(embedder.embed("flood").await.unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_accepts_openai_style_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.6, 0.8]}]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 2)).unwrap();
        let vector = embedder.embed("theft").await.unwrap();
        assert_eq!(vector, vec![0.6, 0.8]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vectors": [[1.0, 0.0], [1.0]]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 2)).unwrap();
        let err = embedder
            .embed_batch(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, got: 1 }));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 2))
            .unwrap()
            .with_retries(1);
        let err = embedder.embed("fire").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"embeddings": [[1.0, 0.0]]}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut cfg = config(&server.uri(), 2);
        cfg.timeout_secs = 1;
        let embedder = HttpEmbedder::new(&cfg).unwrap().with_retries(0);
        let err = embedder.embed("fire").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(1000)));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let embedder = HttpEmbedder::new(&config("http://127.0.0.1:9", 2))
            .unwrap()
            .with_retries(0);
        let err = embedder.embed("fire").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
        assert!(err.is_retryable());
    }
}
