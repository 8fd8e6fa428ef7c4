//! Fable Core - Foundational types for the fable asset pipeline
//!
//! This crate provides the types every other fable crate depends on:
//! - `StoryId`, `OwnerId` - Record identifiers
//! - `ContentHash` - SHA-256 based content hashing
//! - `Story`, `GalleryEntry`, `ColoringTemplate` - Persisted records
//! - Error types and Result alias

mod error;
mod hash;
mod id;
mod record;

pub use error::{FableError, Result};
pub use hash::ContentHash;
pub use id::{OwnerId, StoryId};
pub use record::{is_present_url, ColoringTemplate, GalleryEntry, Story};
