//! Fable Storage - Durable object storage and record persistence
//!
//! This crate defines the contracts the asset pipeline talks to:
//! an object storage gateway keyed by `<category>/<yyyy>/<mm>/<dd>/<name>`
//! and record stores for stories, gallery entries and coloring templates.
//! Filesystem-backed implementations are provided for both.

mod fs_store;
mod object;
mod records;
mod toml_store;

pub use fs_store::FsObjectStore;
pub use object::{build_key, Category, ObjectStore};
pub use records::{GalleryStore, StoryStore, TemplateStore};
pub use toml_store::TomlRecordStore;
