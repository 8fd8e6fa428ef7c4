//! Coloring templates and the background queue that builds them
//!
//! Building a template means converting the cover image, which can take as
//! long as a generation call. Image generation therefore only enqueues the
//! work; a single worker thread drains the queue and logs failures.

use crate::derived::DerivedAssetResolver;
use chrono::Utc;
use crossbeam::channel::{self, Receiver, Sender};
use fable_core::{is_present_url, ColoringTemplate, FableError, Result, Story};
use fable_storage::TemplateStore;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Stock-photo and placeholder hosts that are never turned into templates
pub const PLACEHOLDER_HOSTS: &[&str] = &[
    "picsum.photos",
    "placeholder.com",
    "via.placeholder.com",
    "dummyimage.com",
    "fakeimg.pl",
    "lorempixel.com",
    "unsplash.it",
];

/// Hosts of the object storage backends images are published through
pub const STORAGE_HOSTS: &[&str] = &["amazonaws.com", "cloudfront.net"];

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp"];

/// Whether an image URL is worth deriving a coloring template from
pub fn is_derivable(url: Option<&str>) -> bool {
    let Some(url) = url.filter(|u| is_present_url(Some(*u))) else {
        return false;
    };
    let lower = url.trim().to_lowercase();

    if PLACEHOLDER_HOSTS.iter().any(|host| lower.contains(host)) {
        return false;
    }

    STORAGE_HOSTS.iter().any(|host| lower.contains(host))
        || (lower.starts_with("http") && IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext)))
}

/// Creates at most one coloring template per (story, owner)
#[derive(Clone)]
pub struct TemplateBuilder {
    templates: Arc<dyn TemplateStore>,
    derived: DerivedAssetResolver,
}

impl TemplateBuilder {
    pub fn new(templates: Arc<dyn TemplateStore>, derived: DerivedAssetResolver) -> Self {
        Self { templates, derived }
    }

    /// The story's template, building it if needed
    ///
    /// Returns `Ok(None)` when the story has no image eligible for a template.
    pub fn ensure(&self, story: &Story) -> Result<Option<ColoringTemplate>> {
        if let Some(existing) = self.templates.find_template(&story.id, &story.owner)? {
            tracing::debug!(story_id = %story.id, "coloring template already exists");
            return Ok(Some(existing));
        }

        let Some(image) = story.image().filter(|url| is_derivable(Some(*url))) else {
            tracing::info!(
                story_id = %story.id,
                image = story.image_url.as_deref().unwrap_or(""),
                "image not eligible for a coloring template"
            );
            return Ok(None);
        };

        let bw_url = self.derived.find_or_build(image);
        if bw_url == image {
            return Err(FableError::UpstreamUnavailable(format!(
                "no black/white variant available for {}",
                image
            )));
        }

        let template = ColoringTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            story_id: story.id,
            owner: story.owner.clone(),
            title: template_title(&story.title),
            original_url: image.to_string(),
            bw_url,
            created_at: Utc::now(),
        };
        self.templates.save_template(&template)?;
        tracing::info!(story_id = %story.id, template_id = %template.id, "coloring template created");
        Ok(Some(template))
    }
}

fn template_title(story_title: &str) -> String {
    let title = story_title.trim();
    if title.is_empty() {
        "Fairy tale coloring".to_string()
    } else {
        format!("{} coloring", title)
    }
}

enum TemplateTask {
    Build(Box<Story>),
    /// Answered once every earlier task has finished
    Barrier(Sender<()>),
}

/// Fire-and-forget queue of template builds
pub struct TemplateQueue {
    sender: Option<Sender<TemplateTask>>,
    worker: Option<JoinHandle<()>>,
}

impl TemplateQueue {
    /// Start the worker thread
    pub fn start(builder: TemplateBuilder) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("fable-templates".to_string())
            .spawn(move || run_worker(builder, receiver))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue a template build for `story`; never blocks on the build itself
    pub fn dispatch(&self, story: &Story) {
        let sent = self
            .sender
            .as_ref()
            .map(|s| s.send(TemplateTask::Build(Box::new(story.clone()))).is_ok())
            .unwrap_or(false);
        if sent {
            tracing::debug!(story_id = %story.id, "template build queued");
        } else {
            tracing::error!(story_id = %story.id, "template worker stopped, build dropped");
        }
    }

    /// Block until every build queued so far has finished
    pub fn wait_idle(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done_tx, done_rx) = channel::bounded(1);
        if sender.send(TemplateTask::Barrier(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    fn shutdown(&mut self) {
        // Closing the channel ends the worker loop once the backlog is drained
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("template worker panicked");
            }
        }
    }
}

impl Drop for TemplateQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(builder: TemplateBuilder, receiver: Receiver<TemplateTask>) {
    for task in receiver.iter() {
        match task {
            TemplateTask::Build(story) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| builder.ensure(&story)));
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        tracing::error!(story_id = %story.id, error = %e, "template build failed");
                    }
                    Err(_) => {
                        tracing::error!(story_id = %story.id, "template build panicked");
                    }
                }
            }
            TemplateTask::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}
