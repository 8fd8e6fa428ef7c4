//! HTTP client for the generation service
//!
//! Generation is compute-heavy on the remote side, so requests use a short
//! connect timeout and a read timeout measured in minutes.

use crate::config::{FableConfig, ServiceConfig};
use crate::response;
use crate::service::*;
use fable_core::{FableError, Result};
use serde_json::json;
use std::time::Duration;

const HEALTH_TIMEOUT_SECS: u64 = 5;
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
/// Voice payloads arrive base64-encoded inside JSON
const MAX_BODY_BYTES: u64 = 200 * 1024 * 1024;

/// Generation service reached over HTTP with JSON bodies
pub struct HttpGenerationClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpGenerationClient {
    pub fn from_config(config: &FableConfig) -> Self {
        Self {
            base_url: config.service.base_url.clone(),
            agent: build_agent(&config.service),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// POST a JSON payload and return the raw response body
    ///
    /// Only failures to connect are retried; once a request reaches the
    /// service it is never replayed.
    pub fn invoke(&self, endpoint: &str, payload: &serde_json::Value) -> Result<String> {
        let url = self.endpoint_url(endpoint);

        for attempt in 0..MAX_RETRIES {
            let started = std::time::Instant::now();
            let response = self
                .agent
                .post(&url)
                .header("Content-Type", "application/json")
                .send_json(payload);

            match response {
                Ok(mut ok) => {
                    let body = ok
                        .body_mut()
                        .with_config()
                        .limit(MAX_BODY_BYTES)
                        .read_to_string()
                        .map_err(|e| {
                            FableError::UpstreamUnavailable(format!(
                                "Failed to read {} response: {}",
                                endpoint, e
                            ))
                        })?;
                    tracing::debug!(
                        endpoint,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        bytes = body.len(),
                        "generation service responded"
                    );
                    return Ok(body);
                }
                Err(e) => {
                    if attempt + 1 < MAX_RETRIES && is_connect_error(&e) {
                        tracing::warn!(endpoint, attempt, error = %e, "retrying generation request");
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(upstream_error(endpoint, e));
                }
            }
        }

        Err(FableError::UpstreamUnavailable(format!(
            "{} failed after retries",
            endpoint
        )))
    }
}

fn build_agent(service: &ServiceConfig) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(service.connect_timeout))
        .timeout_recv_response(Some(service.read_timeout))
        .timeout_recv_body(Some(service.read_timeout))
        .build();
    config.into()
}

fn upstream_error(endpoint: &str, e: ureq::Error) -> FableError {
    match e {
        ureq::Error::StatusCode(code) => FableError::UpstreamUnavailable(format!(
            "{} returned HTTP {}",
            endpoint, code
        )),
        other => FableError::UpstreamUnavailable(format!("{} request failed: {}", endpoint, other)),
    }
}

fn is_connect_error(e: &ureq::Error) -> bool {
    matches!(e, ureq::Error::ConnectionFailed | ureq::Error::HostNotFound)
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    match e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => true,
        ureq::Error::StatusCode(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

fn sleep_backoff(attempt: usize) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}

impl GenerationService for HttpGenerationClient {
    fn name(&self) -> &str {
        "http"
    }

    fn health_check(&self) -> Result<ServiceStatus> {
        let url = self.endpoint_url("/health");
        let response = self
            .agent
            .get(&url)
            .config()
            .timeout_global(Some(Duration::from_secs(HEALTH_TIMEOUT_SECS)))
            .build()
            .call();

        Ok(match response {
            Ok(_) => ServiceStatus::Available,
            Err(e) => ServiceStatus::Unavailable(e.to_string()),
        })
    }

    fn generate_story(&self, request: &StoryRequest) -> Result<String> {
        let body = self.invoke(
            "/generate/story",
            &json!({ "name": request.name, "theme": request.theme }),
        )?;
        Ok(response::parse_story(&body))
    }

    fn generate_image(&self, text: &str) -> Result<ImageLocation> {
        let body = self.invoke("/generate/image", &json!({ "text": text }))?;
        response::parse_image_location(&body)
    }

    fn generate_voice(&self, request: &VoiceRequest) -> Result<VoiceClip> {
        let body = self.invoke(
            "/generate/voice",
            &json!({ "text": request.text, "voice": request.voice, "speed": request.speed }),
        )?;
        response::parse_voice(&body, &request.voice)
    }

    fn convert_bw(&self, source: &str) -> Result<ConvertedImage> {
        let body = self.invoke("/convert/bwimage", &json!({ "text": source }))?;
        response::parse_bw_conversion(&body)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        for attempt in 0..MAX_RETRIES {
            match self.agent.get(url).call() {
                Ok(mut ok) => {
                    return ok
                        .body_mut()
                        .with_config()
                        .limit(MAX_BODY_BYTES)
                        .read_to_vec()
                        .map_err(|e| {
                            FableError::UpstreamUnavailable(format!(
                                "Failed to read {}: {}",
                                url, e
                            ))
                        });
                }
                Err(e) => {
                    if attempt + 1 < MAX_RETRIES && is_retryable_error(&e) {
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(upstream_error(url, e));
                }
            }
        }

        Err(FableError::UpstreamUnavailable(format!(
            "Download of {} failed after retries",
            url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> FableConfig {
        let mut config = FableConfig::default();
        // Port 9 (discard) on loopback is closed on test machines
        config.service.base_url = "http://127.0.0.1:9".to_string();
        config.service.connect_timeout = Duration::from_millis(200);
        config
    }

    #[test]
    fn test_endpoint_url_joining() {
        let client = HttpGenerationClient::from_config(&FableConfig::default());
        assert_eq!(
            client.endpoint_url("/generate/story"),
            "http://localhost:8000/generate/story"
        );
        assert_eq!(
            client.endpoint_url("convert/bwimage"),
            "http://localhost:8000/convert/bwimage"
        );
    }

    #[test]
    fn test_unreachable_service_is_upstream_error() {
        let client = HttpGenerationClient::from_config(&unreachable_config());
        let result = client.generate_image("a whale");
        assert!(matches!(result, Err(FableError::UpstreamUnavailable(_))));
    }

    #[test]
    fn test_unreachable_health() {
        let client = HttpGenerationClient::from_config(&unreachable_config());
        assert!(matches!(
            client.health_check().unwrap(),
            ServiceStatus::Unavailable(_)
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(is_retryable_error(&ureq::Error::StatusCode(503)));
        assert!(!is_retryable_error(&ureq::Error::StatusCode(404)));
        assert!(is_connect_error(&ureq::Error::ConnectionFailed));
        assert!(!is_connect_error(&ureq::Error::StatusCode(500)));
    }

    #[test]
    fn test_status_code_in_error() {
        let err = upstream_error("/generate/voice", ureq::Error::StatusCode(502));
        assert!(err.to_string().contains("502"));
    }
}
