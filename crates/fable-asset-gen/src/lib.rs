//! Fable Asset Gen - story asset generation and persistence pipeline
//!
//! Drives an external generation service for story text, cover images,
//! narration and black/white coloring variants, validates the files it
//! produces, publishes them through object storage, and merges the results
//! into story records without clobbering earlier steps.

pub mod config;
pub mod derived;
pub mod merge;
pub mod orchestrator;
pub mod paths;
pub mod response;
pub mod service;
pub mod services;
pub mod template;

pub use config::FableConfig;
pub use derived::{derive_key, DerivedAsset, DerivedAssetResolver};
pub use merge::{save_verified, ImageGuard};
pub use orchestrator::{
    AssetOrchestrator, HealthReport, ImageOutcome, ImageSource, PlaceholderSource,
    StoryCreateRequest, VoiceOptions,
};
pub use paths::{PathPolicy, PathResolver};
pub use service::{
    ConvertedImage, GenerationService, ImageLocation, ServiceStatus, StoryRequest, VoiceClip,
    VoiceRequest,
};
pub use template::{is_derivable, TemplateBuilder, TemplateQueue};
