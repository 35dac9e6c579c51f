use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::config::StoryConfig;
use crate::stream_decoder::Utf8ChunkDecoder;

const GENERATE_PATH: &str = "generate";
const GENERATE_STREAM_PATH: &str = "generate-stream";
const HEALTH_PATH: &str = "health";

#[derive(Debug, Error)]
pub enum StoryApiError {
    #[error("request to story service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("story service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("no data from story service for {0:?}")]
    Timeout(Duration),
    #[error("could not build endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Finite, non-restartable stream of decoded text chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, StoryApiError>> + Send>>;

/// Anything that can open a chunk stream for a story prefix.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    async fn stream_story(&self, prefix: &str) -> Result<ChunkStream, StoryApiError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prefix: &'a str,
    max_length: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

pub struct StoryClient {
    base_url: Url,
    max_length: u32,
    idle_timeout: Option<Duration>,
    client: reqwest::Client,
}

impl StoryClient {
    pub fn new(config: &StoryConfig) -> Self {
        Self {
            base_url: config.api_url.clone(),
            max_length: config.max_length,
            idle_timeout: config.idle_timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoryApiError> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a request, giving up if the response headers take longer than
    /// the idle timeout.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoryApiError> {
        match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, request.send()).await {
                Ok(response) => Ok(response?),
                Err(_) => {
                    error!(?limit, "story service did not respond in time");
                    Err(StoryApiError::Timeout(limit))
                }
            },
            None => Ok(request.send().await?),
        }
    }

    /// One-shot generation. The service returns the prefix followed by the
    /// generated continuation.
    pub async fn generate(&self, prefix: &str) -> Result<String, StoryApiError> {
        let url = self.endpoint(GENERATE_PATH)?;
        let body = GenerateRequest {
            prefix,
            max_length: self.max_length,
        };

        debug!(%url, max_length = self.max_length, "requesting story");

        let response = self.send(self.client.post(url).json(&body)).await?;
        let response = ensure_success(response).await?;
        let story: GenerateResponse = response.json().await?;

        debug!(chars = story.generated_text.chars().count(), "received story");
        Ok(story.generated_text)
    }

    /// Start a streamed generation. Chunks are decoded lazily as the body
    /// arrives; dropping the stream abandons the request.
    pub async fn generate_stream(&self, prefix: &str) -> Result<ChunkStream, StoryApiError> {
        let url = self.endpoint(GENERATE_STREAM_PATH)?;
        let body = GenerateRequest {
            prefix,
            max_length: self.max_length,
        };

        debug!(%url, max_length = self.max_length, "opening story stream");

        let response = self.send(self.client.post(url).json(&body)).await?;
        let response = ensure_success(response).await?;

        info!("story stream opened");
        Ok(decode_chunks(response.bytes_stream(), self.idle_timeout))
    }

    /// Drive a streamed generation, calling `on_chunk` once per decoded
    /// chunk in arrival order.
    pub async fn generate_stream_with<F>(
        &self,
        prefix: &str,
        mut on_chunk: F,
    ) -> Result<(), StoryApiError>
    where
        F: FnMut(&str),
    {
        let mut chunks = self.generate_stream(prefix).await?;
        while let Some(chunk) = chunks.next().await {
            on_chunk(&chunk?);
        }
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthStatus, StoryApiError> {
        let url = self.endpoint(HEALTH_PATH)?;
        let response = self.send(self.client.get(url)).await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl StoryBackend for StoryClient {
    async fn stream_story(&self, prefix: &str) -> Result<ChunkStream, StoryApiError> {
        self.generate_stream(prefix).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoryApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(%status, %body, "story service request failed");
    Err(StoryApiError::Status { status, body })
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: Utf8ChunkDecoder,
    idle_timeout: Option<Duration>,
    finished: bool,
}

/// Turn a body byte stream into a stream of decoded text chunks.
///
/// Reads that only carry part of a character yield nothing. A transport
/// error or an idle timeout is yielded once and ends the stream.
pub fn decode_chunks<S, B, E>(bytes: S, idle_timeout: Option<Duration>) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<StoryApiError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: Utf8ChunkDecoder::new(),
        idle_timeout,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        while !state.finished {
            let next = match state.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, state.bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        state.finished = true;
                        return Some((Err(StoryApiError::Timeout(limit)), state));
                    }
                },
                None => state.bytes.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    let text = state.decoder.decode(chunk.as_ref());
                    if !text.is_empty() {
                        return Some((Ok(text), state));
                    }
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    state.finished = true;
                    let tail = state.decoder.finish();
                    if !tail.is_empty() {
                        return Some((Ok(tail), state));
                    }
                }
            }
        }
        None
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::config::parse_base_url;

    fn client_for(server: &MockServer) -> StoryClient {
        StoryClient::new(&StoryConfig {
            api_url: parse_base_url(&server.uri()).unwrap(),
            max_length: 200,
            idle_timeout: None,
        })
    }

    async fn collect(mut chunks: ChunkStream) -> Vec<Result<String, StoryApiError>> {
        let mut items = Vec::new();
        while let Some(item) = chunks.next().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn generate_posts_prefix_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_json(json!({ "prefix": "ایک دفعہ کا", "max_length": 200 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "generated_text": "ایک دفعہ کا ذکر ہے"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let story = client_for(&server).generate("ایک دفعہ کا").await.unwrap();
        assert_eq!(story, "ایک دفعہ کا ذکر ہے");
    }

    #[tokio::test]
    async fn stream_yields_body_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-stream"))
            .and(body_json(json!({ "prefix": "ایک", "max_length": 200 })))
            .respond_with(ResponseTemplate::new(200).set_body_string(" دفعہ کا ذکر"))
            .mount(&server)
            .await;

        let mut received = String::new();
        client_for(&server)
            .generate_stream_with("ایک", |chunk| received.push_str(chunk))
            .await
            .unwrap();

        assert_eq!(received, " دفعہ کا ذکر");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-stream"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Model not loaded"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate_stream("ایک").await.err().unwrap();
        match err {
            StoryApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "Model not loaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let client = StoryClient::new(&StoryConfig {
            api_url: parse_base_url("http://127.0.0.1:1").unwrap(),
            max_length: 200,
            idle_timeout: None,
        });

        let err = client.generate_stream("ایک").await.err().unwrap();
        assert!(matches!(err, StoryApiError::Transport(_)));
    }

    #[tokio::test]
    async fn health_reports_model_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ok", "model_loaded": false })),
            )
            .mount(&server)
            .await;

        let health = client_for(&server).health().await.unwrap();
        assert_eq!(
            health,
            HealthStatus {
                status: "ok".to_string(),
                model_loaded: false
            }
        );
    }

    #[tokio::test]
    async fn endpoints_join_under_nested_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ok", "model_loaded": true })),
            )
            .mount(&server)
            .await;

        let client = StoryClient::new(&StoryConfig {
            api_url: parse_base_url(&format!("{}/api", server.uri())).unwrap(),
            max_length: 200,
            idle_timeout: None,
        });
        assert!(client.health().await.unwrap().model_loaded);
    }

    #[tokio::test]
    async fn slow_response_headers_hit_the_idle_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("کا")
                    .set_delay(Duration::from_secs(4)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ok", "model_loaded": true }))
                    .set_delay(Duration::from_secs(4)),
            )
            .mount(&server)
            .await;

        let client = StoryClient::new(&StoryConfig {
            api_url: parse_base_url(&server.uri()).unwrap(),
            max_length: 200,
            idle_timeout: Some(Duration::from_millis(500)),
        });

        let started = std::time::Instant::now();
        let err = client.generate_stream("ایک").await.err().unwrap();
        assert!(matches!(
            err,
            StoryApiError::Timeout(limit) if limit == Duration::from_millis(500)
        ));
        assert!(matches!(client.health().await, Err(StoryApiError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn decode_chunks_reassembles_split_characters() {
        let bytes = "دفعہ کا".as_bytes().to_vec();
        let reads: Vec<Result<Vec<u8>, StoryApiError>> = vec![
            Ok(bytes[..1].to_vec()),
            Ok(bytes[1..5].to_vec()),
            Ok(bytes[5..].to_vec()),
        ];

        let items = collect(decode_chunks(stream::iter(reads), None)).await;
        let chunks: Vec<String> = items.into_iter().map(Result::unwrap).collect();

        // the first read held only half a letter and produced nothing
        assert_eq!(chunks, vec!["دف".to_string(), "عہ کا".to_string()]);
    }

    #[tokio::test]
    async fn decode_chunks_stops_after_error() {
        let reads: Vec<Result<&'static [u8], StoryApiError>> = vec![
            Ok("کا".as_bytes()),
            Err(StoryApiError::Timeout(Duration::from_secs(1))),
            Ok("ذکر".as_bytes()),
        ];

        let items = collect(decode_chunks(stream::iter(reads), None)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "کا");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn decode_chunks_flushes_truncated_tail() {
        let bytes = "ذکر".as_bytes();
        let reads: Vec<Result<&'static [u8], StoryApiError>> = vec![Ok(&bytes[..3])];

        let items = collect(decode_chunks(stream::iter(reads), None)).await;
        let chunks: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks, vec!["ذ".to_string(), "\u{FFFD}".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_times_out() {
        let reads = stream::iter(vec![Ok::<_, StoryApiError>("کا".as_bytes())])
            .chain(stream::pending::<Result<&'static [u8], StoryApiError>>());

        let items = collect(decode_chunks(reads, Some(Duration::from_secs(5)))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "کا");
        assert!(matches!(items[1], Err(StoryApiError::Timeout(_))));
    }
}
