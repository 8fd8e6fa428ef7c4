//! Persisted record types
//!
//! The orchestrator reads and writes these records but never owns their
//! lifecycle; creation and deletion belong to the record store.

use crate::id::{OwnerId, StoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a stored URL field holds a real value.
///
/// Empty strings, whitespace and the literal `"null"` (as written by some
/// upstream layers) all count as absent.
pub fn is_present_url(value: Option<&str>) -> bool {
    match value {
        Some(v) => {
            let v = v.trim();
            !v.is_empty() && v != "null"
        }
        None => false,
    }
}

/// A generated story that accumulates assets across independent operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub owner: OwnerId,
    pub title: String,
    pub theme: String,
    pub content: String,
    /// Requested narration voice style
    #[serde(default)]
    pub voice_style: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
    /// Primary (cover) image URL
    #[serde(default)]
    pub image_url: Option<String>,
    /// Narrated voice track URL
    #[serde(default)]
    pub voice_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Story {
    /// Create a story with no assets yet
    pub fn new(owner: OwnerId, theme: &str, title: &str, content: &str) -> Self {
        Self {
            id: StoryId::new(),
            owner,
            title: title.to_string(),
            theme: theme.to_string(),
            content: content.to_string(),
            voice_style: None,
            child_name: None,
            image_url: None,
            voice_url: None,
            created_at: Utc::now(),
        }
    }

    /// The image URL, if one is present
    pub fn image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .filter(|url| is_present_url(Some(*url)))
    }

    /// The voice URL, if one is present
    pub fn voice(&self) -> Option<&str> {
        self.voice_url
            .as_deref()
            .filter(|url| is_present_url(Some(*url)))
    }

    pub fn has_image(&self) -> bool {
        self.image().is_some()
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }
}

/// Companion catalog entry pointing at a story's primary image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub story_id: StoryId,
    pub owner: OwnerId,
    pub story_title: String,
    #[serde(default)]
    pub color_image_url: Option<String>,
    pub child_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A black-and-white coloring variant of a story's cover image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColoringTemplate {
    pub id: String,
    pub story_id: StoryId,
    pub owner: OwnerId,
    pub title: String,
    pub original_url: String,
    pub bw_url: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Story {
        Story::new(OwnerId::new("mina"), "forest", "forest fairy tale", "Once upon a time")
    }

    #[test]
    fn test_present_url() {
        assert!(is_present_url(Some("https://x/y.png")));
        assert!(!is_present_url(Some("")));
        assert!(!is_present_url(Some("   ")));
        assert!(!is_present_url(Some("null")));
        assert!(!is_present_url(None));
    }

    #[test]
    fn test_story_image_filters_null_literal() {
        let mut story = sample();
        assert!(!story.has_image());

        story.image_url = Some("null".to_string());
        assert!(!story.has_image());

        story.image_url = Some("https://cdn.example/story-images/a.png".to_string());
        assert_eq!(story.image(), Some("https://cdn.example/story-images/a.png"));
    }

    #[test]
    fn test_story_toml_roundtrip() {
        let mut story = sample();
        story.voice_url = Some("https://cdn.example/voices/v.mp3".to_string());
        let text = toml::to_string_pretty(&story).unwrap();
        let parsed: Story = toml::from_str(&text).unwrap();
        assert_eq!(parsed, story);
        assert!(parsed.image_url.is_none());
    }

    #[test]
    fn test_ownership() {
        let story = sample();
        assert!(story.is_owned_by(&OwnerId::new("mina")));
        assert!(!story.is_owned_by(&OwnerId::new("joon")));
    }
}
