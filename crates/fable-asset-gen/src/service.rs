//! Generation service trait and request/result types

use fable_core::Result;
use serde::{Deserialize, Serialize};

/// Request body for `POST /generate/story`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRequest {
    /// Name of the child the story is written for
    pub name: String,
    pub theme: String,
}

/// Request body for `POST /generate/voice`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

impl VoiceRequest {
    /// Build a request, substituting defaults for a missing voice or a non-positive speed
    pub fn new(text: &str, voice: Option<&str>, speed: Option<f32>, default_voice: &str) -> Self {
        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default_voice);

        Self {
            text: text.to_string(),
            voice: voice.to_string(),
            speed: speed.filter(|s| *s > 0.0).unwrap_or(1.0),
        }
    }
}

/// Where the service says a generated image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    /// A path on the service's filesystem, possibly relative
    Local(String),
    /// An `http(s)://` URL that still has to be downloaded
    Remote(String),
}

impl ImageLocation {
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ImageLocation::Remote(trimmed.to_string())
        } else {
            ImageLocation::Local(trimmed.to_string())
        }
    }
}

/// Synthesized narration
#[derive(Debug, Clone)]
pub struct VoiceClip {
    pub audio: Vec<u8>,
    /// Voice the service actually used
    pub voice: String,
}

/// Result of a black/white conversion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertedImage {
    /// The service wrote the image and returned its path
    Path(String),
    /// The service returned the encoded image inline
    Inline(Vec<u8>),
}

/// Status returned by a service health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Available,
    Unavailable(String),
}

/// The external generation service (HTTP or mock)
pub trait GenerationService: Send + Sync {
    /// Service name (e.g. "http", "mock")
    fn name(&self) -> &str;

    fn health_check(&self) -> Result<ServiceStatus>;

    /// Generate story text
    fn generate_story(&self, request: &StoryRequest) -> Result<String>;

    /// Illustrate a piece of text
    fn generate_image(&self, text: &str) -> Result<ImageLocation>;

    /// Narrate a piece of text
    fn generate_voice(&self, request: &VoiceRequest) -> Result<VoiceClip>;

    /// Convert a local image into a black/white line drawing
    fn convert_bw(&self, source: &str) -> Result<ConvertedImage>;

    /// Download a remote file produced by the service
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_request_defaults() {
        let req = VoiceRequest::new("hello", None, None, "alloy");
        assert_eq!(req.voice, "alloy");
        assert_eq!(req.speed, 1.0);

        let req = VoiceRequest::new("hello", Some("  "), Some(-2.0), "alloy");
        assert_eq!(req.voice, "alloy");
        assert_eq!(req.speed, 1.0);

        let req = VoiceRequest::new("hello", Some("nova"), Some(1.25), "alloy");
        assert_eq!(req.voice, "nova");
        assert_eq!(req.speed, 1.25);
    }

    #[test]
    fn test_classify_location() {
        assert_eq!(
            ImageLocation::classify(" HTTPS://cdn.example.com/a.png "),
            ImageLocation::Remote("HTTPS://cdn.example.com/a.png".to_string())
        );
        assert_eq!(
            ImageLocation::classify("./output/a.png"),
            ImageLocation::Local("./output/a.png".to_string())
        );
    }
}
