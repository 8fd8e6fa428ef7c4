//! Asset orchestrator
//!
//! Coordinates the generation service, local file handling, object storage and
//! the record stores for every story asset operation.
//!
//! Cover images move through an explicit state machine:
//!
//! ```text
//! NoImage ──> Generating ──> Uploading ──> Persisted
//!    │             │              │
//!    │             └──────────────┴──────> Fallback
//!    └──(image already stored)──────────> Persisted (reused)
//! ```
//!
//! `Fallback` stores a placeholder URL, so after [`AssetOrchestrator::create_image`]
//! returns the story always has an image.

use crate::config::FableConfig;
use crate::derived::{remove_quietly, DerivedAssetResolver};
use crate::merge::{save_verified, ImageGuard};
use crate::paths::{PathPolicy, PathResolver};
use crate::service::{GenerationService, ImageLocation, ServiceStatus, StoryRequest, VoiceRequest};
use crate::template::{TemplateBuilder, TemplateQueue};
use chrono::Utc;
use fable_core::{ColoringTemplate, FableError, GalleryEntry, OwnerId, Result, Story, StoryId};
use fable_storage::{Category, GalleryStore, ObjectStore, StoryStore, TemplateStore};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Input for [`AssetOrchestrator::create_story`]
#[derive(Debug, Clone, Default)]
pub struct StoryCreateRequest {
    pub theme: String,
    pub voice: Option<String>,
    pub child_name: Option<String>,
}

/// Narration options for [`AssetOrchestrator::create_voice`]
#[derive(Debug, Clone, Default)]
pub struct VoiceOptions {
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

/// Where a story's image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// The story already had an image
    Reused,
    Generated,
    /// Generation failed and a placeholder was stored
    Placeholder,
}

/// Result of [`AssetOrchestrator::create_image`]
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub story: Story,
    pub source: ImageSource,
}

/// Reachability of the external collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub service: ServiceStatus,
    pub storage_available: bool,
}

/// A generated image on the local filesystem
struct LocalImage {
    path: PathBuf,
    /// Set when the file is our own download rather than the service's output
    _download: Option<tempfile::TempPath>,
}

enum ImageStage {
    NoImage,
    Generating,
    Uploading(LocalImage),
    Persisted { url: String, source: ImageSource },
    Fallback(FableError),
}

/// Placeholder image URLs, distinct per call
pub struct PlaceholderSource {
    base_url: String,
    last: AtomicU64,
}

impl PlaceholderSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            last: AtomicU64::new(0),
        }
    }

    /// `<base>?random=<millis>`, strictly increasing across calls
    pub fn next_url(&self) -> String {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut stamp = now;
        let _ = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                stamp = now.max(last + 1);
                Some(stamp)
            });
        format!("{}?random={}", self.base_url, stamp)
    }

    pub fn is_placeholder(&self, url: &str) -> bool {
        url.starts_with(&format!("{}?random=", self.base_url))
    }
}

/// Top-level coordinator of story asset generation
pub struct AssetOrchestrator {
    config: FableConfig,
    service: Arc<dyn GenerationService>,
    store: Arc<dyn ObjectStore>,
    stories: Arc<dyn StoryStore>,
    gallery: Arc<dyn GalleryStore>,
    resolver: PathResolver,
    policy: PathPolicy,
    derived: DerivedAssetResolver,
    templates: TemplateBuilder,
    queue: TemplateQueue,
    placeholder: PlaceholderSource,
}

impl AssetOrchestrator {
    pub fn new(
        config: FableConfig,
        service: Arc<dyn GenerationService>,
        store: Arc<dyn ObjectStore>,
        stories: Arc<dyn StoryStore>,
        gallery: Arc<dyn GalleryStore>,
        templates: Arc<dyn TemplateStore>,
    ) -> Result<Self> {
        let resolver = PathResolver::new(&config.service.workdir);
        let policy = PathPolicy::from_config(&config.paths);
        let derived = DerivedAssetResolver::new(
            store.clone(),
            service.clone(),
            resolver.clone(),
            policy.clone(),
            config.generation.scratch_dir.clone(),
        );
        let templates = TemplateBuilder::new(templates, derived.clone());
        let queue = TemplateQueue::start(templates.clone())?;
        let placeholder = PlaceholderSource::new(&config.generation.placeholder_url);

        Ok(Self {
            config,
            service,
            store,
            stories,
            gallery,
            resolver,
            policy,
            derived,
            templates,
            queue,
            placeholder,
        })
    }

    pub fn config(&self) -> &FableConfig {
        &self.config
    }

    pub fn placeholder(&self) -> &PlaceholderSource {
        &self.placeholder
    }

    // --- Stories ---

    /// Generate story text and store a new story without assets
    pub fn create_story(&self, owner: &OwnerId, request: &StoryCreateRequest) -> Result<Story> {
        let child_name = request
            .child_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.config.generation.default_child_name)
            .to_string();
        let theme = request.theme.trim();
        let title = format!("{} fairy tale", theme);

        let content = self.service.generate_story(&StoryRequest {
            name: child_name.clone(),
            theme: title.clone(),
        })?;

        let mut story = Story::new(owner.clone(), theme, &title, &content);
        story.voice_style = request
            .voice
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        story.child_name = Some(child_name);

        let saved = self.stories.save(&story)?;
        tracing::info!(story_id = %saved.id, owner = %owner, "story created");
        Ok(saved)
    }

    pub fn get_story(&self, id: &StoryId, owner: &OwnerId) -> Result<Story> {
        self.load_owned(id, owner)
    }

    pub fn list_stories(&self, owner: &OwnerId) -> Result<Vec<Story>> {
        self.stories.list_by_owner(owner)
    }

    /// Delete a story and its stored voice track
    pub fn delete_story(&self, id: &StoryId, owner: &OwnerId) -> Result<()> {
        let story = self.load_owned(id, owner)?;

        if let Some(key) = story.voice().and_then(|url| self.store.extract_key(url)) {
            match self.store.delete(&key) {
                Ok(_) => tracing::info!(story_id = %id, key = %key, "voice object deleted"),
                Err(e) => tracing::warn!(story_id = %id, key = %key, error = %e, "voice object not deleted"),
            }
        }

        self.stories.delete(id)?;
        tracing::info!(story_id = %id, "story deleted");
        Ok(())
    }

    fn load_owned(&self, id: &StoryId, owner: &OwnerId) -> Result<Story> {
        let story = self
            .stories
            .find(id)?
            .ok_or_else(|| FableError::RecordNotFound(format!("story {}", id)))?;
        if !story.is_owned_by(owner) {
            return Err(FableError::AccessDenied(format!(
                "story {} does not belong to {}",
                id, owner
            )));
        }
        Ok(story)
    }

    // --- Images ---

    /// Give the story a cover image, generating one if it has none
    pub fn create_image(&self, id: &StoryId, owner: &OwnerId) -> Result<ImageOutcome> {
        let mut story = self.load_owned(id, owner)?;

        let mut stage = ImageStage::NoImage;
        let (url, source) = loop {
            stage = match stage {
                ImageStage::NoImage => match story.image() {
                    Some(existing) => ImageStage::Persisted {
                        url: existing.to_string(),
                        source: ImageSource::Reused,
                    },
                    None => ImageStage::Generating,
                },
                ImageStage::Generating => match self.generate_local_image(&story) {
                    Ok(local) => ImageStage::Uploading(local),
                    Err(e) => ImageStage::Fallback(e),
                },
                ImageStage::Uploading(local) => match self.upload_primary(local) {
                    Ok(url) => ImageStage::Persisted {
                        url,
                        source: ImageSource::Generated,
                    },
                    Err(e) => ImageStage::Fallback(e),
                },
                ImageStage::Persisted { url, source } => break (url, source),
                ImageStage::Fallback(e) => {
                    tracing::warn!(story_id = %id, error = %e, "image generation failed, using placeholder");
                    break (self.placeholder.next_url(), ImageSource::Placeholder);
                }
            };
        };

        story.image_url = Some(url);
        let story = self.stories.save(&story)?;

        if source != ImageSource::Placeholder {
            self.ensure_gallery_entry(&story);
            self.queue.dispatch(&story);
        }

        tracing::info!(story_id = %id, source = ?source, image = story.image().unwrap_or(""), "story image stored");
        Ok(ImageOutcome { story, source })
    }

    fn generate_local_image(&self, story: &Story) -> Result<LocalImage> {
        match self.service.generate_image(&story.content)? {
            ImageLocation::Local(raw) => {
                let path = self.resolver.resolve(&raw);
                if !path.exists() {
                    return Err(FableError::AssetNotFound(path));
                }
                Ok(LocalImage {
                    path,
                    _download: None,
                })
            }
            ImageLocation::Remote(url) => {
                let bytes = self.service.fetch(&url)?;
                let download = self.scratch_file("image-", &remote_extension(&url), &bytes)?;
                Ok(LocalImage {
                    path: download.to_path_buf(),
                    _download: Some(download),
                })
            }
        }
    }

    /// Validate, upload and delete a generated image
    fn upload_primary(&self, local: LocalImage) -> Result<String> {
        let canonical = match self.policy.ensure_safe(&local.path) {
            Ok(canonical) => canonical,
            Err(FableError::UnsafePath(rejected)) => {
                if self.policy.in_working_location(&rejected) {
                    remove_quietly(rejected.clone());
                } else {
                    tracing::warn!(path = %rejected.display(), "rejected file left in place");
                }
                return Err(FableError::UnsafePath(rejected));
            }
            Err(e) => return Err(e),
        };
        let canonical = scopeguard::guard(canonical, remove_quietly as fn(PathBuf));
        self.store.upload(&canonical, Category::StoryImages)
    }

    /// Write `bytes` to a scratch file that is deleted when the handle drops
    fn scratch_file(&self, prefix: &str, ext: &str, bytes: &[u8]) -> Result<tempfile::TempPath> {
        let dir = &self.config.generation.scratch_dir;
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(&format!(".{}", ext))
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    /// Create or refresh the gallery entry pointing at the story's image
    ///
    /// Failures are logged and never reach the caller.
    pub fn ensure_gallery_entry(&self, story: &Story) {
        if let Err(e) = self.upsert_gallery_entry(story) {
            tracing::error!(story_id = %story.id, error = %e, "gallery entry not updated");
        }
    }

    fn upsert_gallery_entry(&self, story: &Story) -> Result<()> {
        let image = story.image().map(str::to_string);
        let entry = match self.gallery.find_entry(&story.id, &story.owner)? {
            Some(mut entry) => {
                entry.color_image_url = image;
                entry.updated_at = Some(Utc::now());
                entry
            }
            None => GalleryEntry {
                story_id: story.id,
                owner: story.owner.clone(),
                story_title: story.title.clone(),
                color_image_url: image,
                child_name: story
                    .child_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| self.config.generation.default_child_name.clone()),
                created_at: Utc::now(),
                updated_at: None,
            },
        };
        self.gallery.save_entry(&entry)
    }

    /// Black/white variant of an image URL, or the URL itself when none can be made
    pub fn black_white(&self, image_url: &str) -> String {
        self.derived.find_or_build(image_url)
    }

    /// Build the story's coloring template now, surfacing any failure
    pub fn create_template_now(&self, id: &StoryId, owner: &OwnerId) -> Result<ColoringTemplate> {
        let story = self.load_owned(id, owner)?;
        self.templates.ensure(&story)?.ok_or_else(|| {
            FableError::RecordNotFound(format!("template-eligible image for story {}", id))
        })
    }

    /// Block until queued template builds have finished
    pub fn wait_for_templates(&self) {
        self.queue.wait_idle();
    }

    // --- Voice ---

    /// Narrate the story and store the voice track, keeping its image intact
    pub fn create_voice(&self, id: &StoryId, owner: &OwnerId, options: &VoiceOptions) -> Result<Story> {
        let story = self.load_owned(id, owner)?;
        let guard = ImageGuard::capture(&story);

        let requested_voice = options.voice.as_deref().or(story.voice_style.as_deref());
        let request = VoiceRequest::new(
            &story.content,
            requested_voice,
            options.speed,
            &self.config.generation.default_voice,
        );
        let clip = self.service.generate_voice(&request)?;

        let ext = if clip.audio.starts_with(b"RIFF") { "wav" } else { "mp3" };
        let audio = self.scratch_file("voice-", ext, &clip.audio)?;
        let voice_url = self.store.upload(&audio, Category::Voices)?;
        drop(audio);

        // Another request may have written or deleted the story since it was loaded
        let Some(mut current) = self.stories.find(id)? else {
            if let Some(key) = self.store.extract_key(&voice_url) {
                let _ = self.store.delete(&key);
            }
            return Err(FableError::RecordNotFound(format!("story {}", id)));
        };
        current.voice_url = Some(voice_url);
        current.voice_style = Some(clip.voice);

        let saved = save_verified(self.stories.as_ref(), current, &guard)?;
        tracing::info!(story_id = %id, voice = saved.voice().unwrap_or(""), "story voice stored");
        Ok(saved)
    }

    /// Time-limited URL for the story's voice track
    pub fn temporary_voice_url(&self, id: &StoryId, owner: &OwnerId, ttl_minutes: u32) -> Result<String> {
        let story = self.load_owned(id, owner)?;
        let voice = story
            .voice()
            .ok_or_else(|| FableError::RecordNotFound(format!("voice for story {}", id)))?;

        match self.store.extract_key(voice) {
            Some(key) => self.store.presign(&key, ttl_minutes),
            None => {
                tracing::warn!(story_id = %id, "voice URL is not a storage URL, returning it as is");
                Ok(voice.to_string())
            }
        }
    }

    /// Bytes of a stored voice track
    pub fn download_voice(&self, voice_url: &str) -> Result<Vec<u8>> {
        let key = self
            .store
            .extract_key(voice_url)
            .ok_or_else(|| FableError::RecordNotFound(format!("object for {}", voice_url)))?;
        self.store.download(&key)
    }

    // --- Health ---

    pub fn health(&self) -> HealthReport {
        let service = self
            .service
            .health_check()
            .unwrap_or_else(|e| ServiceStatus::Unavailable(e.to_string()));
        HealthReport {
            service,
            storage_available: self.store.is_available(),
        }
    }
}

fn remote_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .filter(|e| matches!(e.as_str(), "png" | "jpg" | "jpeg" | "webp"))
        .unwrap_or_else(|| "png".to_string())
}
