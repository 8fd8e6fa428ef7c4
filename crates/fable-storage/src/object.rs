//! Object storage gateway contract and key layout

use chrono::{DateTime, Datelike, Utc};
use fable_core::Result;
use std::fmt;
use std::path::Path;

/// Logical category an object is stored under (the first key segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Generated cover images
    StoryImages,
    /// Black/white coloring variants of cover images
    BwImages,
    /// Narrated voice tracks
    Voices,
}

impl Category {
    pub fn prefix(&self) -> &'static str {
        match self {
            Category::StoryImages => "story-images",
            Category::BwImages => "bw-images",
            Category::Voices => "voices",
        }
    }

    /// Stem used for object names in this category
    fn object_stem(&self) -> &'static str {
        match self {
            Category::StoryImages | Category::BwImages => "image",
            Category::Voices => "voice",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Build an object key: `<category>/<yyyy>/<mm>/<dd>/<stem>-<identifier>.<ext>`
pub fn build_key(category: Category, date: DateTime<Utc>, identifier: &str, ext: &str) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}-{}.{}",
        category.prefix(),
        date.year(),
        date.month(),
        date.day(),
        category.object_stem(),
        identifier,
        ext.trim_start_matches('.').to_lowercase()
    )
}

/// Durable storage addressed by key, exposed to clients by URL.
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under a backend-assigned key in `category`
    fn upload(&self, local_path: &Path, category: Category) -> Result<String>;

    /// Upload a local file under an exact key
    fn upload_with_key(&self, local_path: &Path, key: &str) -> Result<String>;

    fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete an object, returning whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Lightweight existence probe for a public URL
    fn exists(&self, url: &str) -> bool;

    /// Map a public URL back to its key, if it belongs to this backend
    fn extract_key(&self, url: &str) -> Option<String>;

    /// Public URL for a key
    fn url_for(&self, key: &str) -> String;

    /// Time-limited URL for a key
    fn presign(&self, key: &str, ttl_minutes: u32) -> Result<String>;

    /// Whether the backend can currently serve requests
    fn is_available(&self) -> bool;

    /// Whether a URL is served by this backend
    fn owns_url(&self, url: &str) -> bool {
        self.extract_key(url).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_key_layout() {
        let date = Utc.with_ymd_and_hms(2025, 6, 13, 9, 30, 0).unwrap();
        let key = build_key(Category::StoryImages, date, "6cb8f206", "PNG");
        assert_eq!(key, "story-images/2025/06/13/image-6cb8f206.png");

        let key = build_key(Category::Voices, date, "0a1b2c3d", ".mp3");
        assert_eq!(key, "voices/2025/06/13/voice-0a1b2c3d.mp3");
    }

    #[test]
    fn test_category_prefixes_are_distinct() {
        let all = [Category::StoryImages, Category::BwImages, Category::Voices];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.prefix(), b.prefix());
            }
        }
    }
}
