//! Record store contracts
//!
//! The asset pipeline only needs create/read/update/delete by identifier
//! and by owner; any backing store implementing these traits can be used.

use fable_core::{ColoringTemplate, GalleryEntry, OwnerId, Result, Story, StoryId};

/// Persistence for story records
pub trait StoryStore: Send + Sync {
    fn find(&self, id: &StoryId) -> Result<Option<Story>>;

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Story>>;

    /// Insert or replace a story, returning the stored state
    fn save(&self, story: &Story) -> Result<Story>;

    /// Delete a story, returning whether it existed
    fn delete(&self, id: &StoryId) -> Result<bool>;
}

/// Persistence for gallery entries, one per (story, owner)
pub trait GalleryStore: Send + Sync {
    fn find_entry(&self, story_id: &StoryId, owner: &OwnerId) -> Result<Option<GalleryEntry>>;

    fn save_entry(&self, entry: &GalleryEntry) -> Result<()>;
}

/// Persistence for coloring templates, one per (story, owner)
pub trait TemplateStore: Send + Sync {
    fn find_template(
        &self,
        story_id: &StoryId,
        owner: &OwnerId,
    ) -> Result<Option<ColoringTemplate>>;

    fn save_template(&self, template: &ColoringTemplate) -> Result<()>;
}
