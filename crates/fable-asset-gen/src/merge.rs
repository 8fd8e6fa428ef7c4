//! Guarded story updates
//!
//! Image and voice generation update the same story independently. A step
//! that only meant to set the voice must never leave the story without the
//! image an earlier step stored, so writes carry an [`ImageGuard`] and are
//! read back after saving.

use fable_core::{FableError, Result, Story, StoryId};
use fable_storage::StoryStore;

/// The image URL a story had before an unrelated update started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGuard {
    story_id: StoryId,
    image_url: Option<String>,
}

impl ImageGuard {
    pub fn capture(story: &Story) -> Self {
        Self {
            story_id: story.id,
            image_url: story.image().map(str::to_string),
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// Write the captured image back onto `story`, unconditionally
    pub fn reassert(&self, story: &mut Story) {
        if let Some(url) = &self.image_url {
            story.image_url = Some(url.clone());
        }
    }

    /// Check that a stored story still carries the captured image
    pub fn verify(&self, stored: &Story) -> Result<()> {
        match &self.image_url {
            Some(expected) if !stored.has_image() => Err(FableError::IntegrityViolation(format!(
                "story {} lost image {} during update",
                self.story_id, expected
            ))),
            _ => Ok(()),
        }
    }
}

/// Save `story` with the guarded image re-asserted, read it back, and repair
/// the image if the stored copy lost it
pub fn save_verified(store: &dyn StoryStore, mut story: Story, guard: &ImageGuard) -> Result<Story> {
    guard.reassert(&mut story);
    store.save(&story)?;

    let stored = store
        .find(&story.id)?
        .ok_or_else(|| FableError::RecordNotFound(format!("story {}", story.id)))?;

    match guard.verify(&stored) {
        Ok(()) => Ok(stored),
        Err(FableError::IntegrityViolation(reason)) => {
            tracing::error!(story_id = %story.id, %reason, "repairing story image");
            let mut repaired = stored;
            guard.reassert(&mut repaired);
            store.save(&repaired)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_core::OwnerId;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Story store that drops the image field on its first `n` saves
    struct LossyStore {
        stories: Mutex<HashMap<StoryId, Story>>,
        lose_images: AtomicUsize,
        saves: AtomicUsize,
    }

    impl LossyStore {
        fn new(lose_images: usize) -> Self {
            Self {
                stories: Mutex::new(HashMap::new()),
                lose_images: AtomicUsize::new(lose_images),
                saves: AtomicUsize::new(0),
            }
        }
    }

    impl StoryStore for LossyStore {
        fn find(&self, id: &StoryId) -> Result<Option<Story>> {
            Ok(self.stories.lock().unwrap().get(id).cloned())
        }

        fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Story>> {
            Ok(self
                .stories
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.is_owned_by(owner))
                .cloned()
                .collect())
        }

        fn save(&self, story: &Story) -> Result<Story> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let mut stored = story.clone();
            if self.lose_images.load(Ordering::SeqCst) > 0 {
                self.lose_images.fetch_sub(1, Ordering::SeqCst);
                stored.image_url = None;
            }
            self.stories.lock().unwrap().insert(stored.id, stored.clone());
            Ok(stored)
        }

        fn delete(&self, id: &StoryId) -> Result<bool> {
            Ok(self.stories.lock().unwrap().remove(id).is_some())
        }
    }

    fn story_with_image() -> Story {
        let mut story = Story::new(OwnerId::new("mina"), "sea", "sea fairy tale", "A whale sang.");
        story.image_url = Some("https://cdn/story-images/a.png".to_string());
        story
    }

    #[test]
    fn test_reassert_over_stale_copy() {
        let store = LossyStore::new(0);
        let original = story_with_image();
        let guard = ImageGuard::capture(&original);

        // A reloaded copy that never saw the image
        let mut stale = original.clone();
        stale.image_url = Some("null".to_string());
        stale.voice_url = Some("https://cdn/voices/a.mp3".to_string());

        let saved = save_verified(&store, stale, &guard).unwrap();
        assert_eq!(saved.image(), Some("https://cdn/story-images/a.png"));
        assert_eq!(saved.voice(), Some("https://cdn/voices/a.mp3"));
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lost_image_is_repaired() {
        let store = LossyStore::new(1);
        let story = story_with_image();
        let guard = ImageGuard::capture(&story);

        let saved = save_verified(&store, story.clone(), &guard).unwrap();
        assert_eq!(saved.image(), story.image());
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
        assert!(store.find(&story.id).unwrap().unwrap().has_image());
    }

    #[test]
    fn test_empty_guard_never_repairs() {
        let store = LossyStore::new(1);
        let mut story = story_with_image();
        story.image_url = None;
        let guard = ImageGuard::capture(&story);
        assert_eq!(guard.image_url(), None);

        let saved = save_verified(&store, story, &guard).unwrap();
        assert!(!saved.has_image());
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_verify_reports_integrity_violation() {
        let story = story_with_image();
        let guard = ImageGuard::capture(&story);
        let mut stored = story.clone();
        stored.image_url = Some(String::new());
        assert!(matches!(
            guard.verify(&stored),
            Err(FableError::IntegrityViolation(_))
        ));
        assert!(guard.verify(&story).is_ok());
    }
}
