//! Schema-tolerant parsing of generation service responses
//!
//! The service is not consistent about field names, so each extractor probes a
//! fixed list of known names in order and takes the first usable value.

use crate::service::{ConvertedImage, ImageLocation, VoiceClip};
use base64::Engine;
use fable_core::{is_present_url, FableError, Result};
use serde_json::Value;

/// Field names an image location may arrive under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageField {
    ImagePath,
    ImageUrl,
    FilePath,
    Path,
    SavePath,
}

impl ImageField {
    /// Probe order; the first usable field wins
    pub const PRECEDENCE: [ImageField; 5] = [
        ImageField::ImagePath,
        ImageField::ImageUrl,
        ImageField::FilePath,
        ImageField::Path,
        ImageField::SavePath,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ImageField::ImagePath => "image_path",
            ImageField::ImageUrl => "image_url",
            ImageField::FilePath => "file_path",
            ImageField::Path => "path",
            ImageField::SavePath => "save_path",
        }
    }
}

fn parse_object(body: &str, what: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FableError::MalformedResponse(format!("{} response is not JSON: {}", what, e)))?;
    if !value.is_object() {
        return Err(FableError::MalformedResponse(format!(
            "{} response is not a JSON object",
            what
        )));
    }
    Ok(value)
}

/// A string field that is present, non-blank and not the literal "null"
fn usable_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| is_present_url(Some(*s)))
        .map(str::trim)
}

/// Story text: the `story` field, or the whole body when absent
pub fn parse_story(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("story").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Which alias carried the image location, and its value
pub fn find_image_field(body: &str) -> Result<(ImageField, String)> {
    let value = parse_object(body, "Image")?;

    ImageField::PRECEDENCE
        .iter()
        .find_map(|field| usable_str(&value, field.key()).map(|s| (*field, s.to_string())))
        .ok_or_else(|| {
            let known: Vec<&str> = ImageField::PRECEDENCE.iter().map(|f| f.key()).collect();
            FableError::MalformedResponse(format!(
                "No image location in response (looked for {})",
                known.join(", ")
            ))
        })
}

pub fn parse_image_location(body: &str) -> Result<ImageLocation> {
    let (field, raw) = find_image_field(body)?;
    tracing::debug!(field = field.key(), "image location found");
    Ok(ImageLocation::classify(&raw))
}

/// Voice payload: `audio_base64` is required, `voice` falls back to `requested_voice`
pub fn parse_voice(body: &str, requested_voice: &str) -> Result<VoiceClip> {
    let value = parse_object(body, "Voice")?;

    let encoded = usable_str(&value, "audio_base64").ok_or_else(|| {
        FableError::MalformedResponse("Voice response has no audio_base64".to_string())
    })?;
    let audio = decode_base64(encoded)?;
    if audio.is_empty() {
        return Err(FableError::MalformedResponse(
            "Voice response carried empty audio".to_string(),
        ));
    }

    let voice = usable_str(&value, "voice").unwrap_or(requested_voice).to_string();
    Ok(VoiceClip { audio, voice })
}

/// Conversion payload: a ready `image_url` path first, else inline base64 `image`
pub fn parse_bw_conversion(body: &str) -> Result<ConvertedImage> {
    let value = parse_object(body, "Conversion")?;

    if let Some(path) = usable_str(&value, "image_url") {
        return Ok(ConvertedImage::Path(path.to_string()));
    }
    if let Some(encoded) = usable_str(&value, "image") {
        return Ok(ConvertedImage::Inline(decode_base64(encoded)?));
    }

    Err(FableError::MalformedResponse(
        "Conversion response has neither image_url nor image".to_string(),
    ))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    // Some encoders send a data URL prefix
    let payload = match encoded.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FableError::MalformedResponse(format!("Invalid base64 payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_story_field_or_body() {
        assert_eq!(parse_story(r#"{"story": "Once upon a time"}"#), "Once upon a time");
        assert_eq!(parse_story("Plain text story"), "Plain text story");
        assert_eq!(parse_story(r#"{"title": "x"}"#), r#"{"title": "x"}"#);
    }

    #[test]
    fn test_file_path_alias() {
        let body = r#"{"file_path": "/tmp/fable/cover.png", "status": "ok"}"#;
        let (field, value) = find_image_field(body).unwrap();
        assert_eq!(field, ImageField::FilePath);
        assert_eq!(value, "/tmp/fable/cover.png");
    }

    #[test]
    fn test_alias_precedence() {
        let body = r#"{
            "save_path": "/tmp/d.png",
            "path": "/tmp/c.png",
            "image_url": "/tmp/b.png",
            "image_path": "/tmp/a.png"
        }"#;
        assert_eq!(
            parse_image_location(body).unwrap(),
            ImageLocation::Local("/tmp/a.png".to_string())
        );
    }

    #[test]
    fn test_null_and_blank_aliases_are_skipped() {
        let body = r#"{"image_path": "null", "image_url": "   ", "file_path": null, "path": "out/x.png"}"#;
        let (field, value) = find_image_field(body).unwrap();
        assert_eq!(field, ImageField::Path);
        assert_eq!(value, "out/x.png");
    }

    #[test]
    fn test_missing_image_field_is_malformed() {
        let result = parse_image_location(r#"{"message": "done"}"#);
        assert!(matches!(result, Err(FableError::MalformedResponse(_))));
        let result = parse_image_location("not json");
        assert!(matches!(result, Err(FableError::MalformedResponse(_))));
    }

    #[test]
    fn test_remote_image_location() {
        let body = r#"{"image_url": "https://service.example.com/out/a.png"}"#;
        assert_eq!(
            parse_image_location(body).unwrap(),
            ImageLocation::Remote("https://service.example.com/out/a.png".to_string())
        );
    }

    #[test]
    fn test_parse_voice() {
        let body = r#"{"audio_base64": "UklGRg==", "voice": "nova"}"#;
        let clip = parse_voice(body, "alloy").unwrap();
        assert_eq!(clip.audio, b"RIFF");
        assert_eq!(clip.voice, "nova");

        let clip = parse_voice(r#"{"audio_base64": "UklGRg=="}"#, "alloy").unwrap();
        assert_eq!(clip.voice, "alloy");

        assert!(parse_voice(r#"{"voice": "nova"}"#, "alloy").is_err());
        assert!(parse_voice(r#"{"audio_base64": "@@@"}"#, "alloy").is_err());
    }

    #[test]
    fn test_parse_bw_conversion() {
        assert_eq!(
            parse_bw_conversion(r#"{"image_url": "bw_cover.png", "image": "aGk="}"#).unwrap(),
            ConvertedImage::Path("bw_cover.png".to_string())
        );
        assert_eq!(
            parse_bw_conversion(r#"{"image": "data:image/png;base64,aGk="}"#).unwrap(),
            ConvertedImage::Inline(b"hi".to_vec())
        );
        assert!(parse_bw_conversion(r#"{}"#).is_err());
    }
}
