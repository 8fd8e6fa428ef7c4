//! File-based record store
//!
//! Records are persisted as TOML files so they survive process restarts:
//! - `stories/<id>.story.toml`
//! - `gallery/<story>.<owner-hash>.gallery.toml`
//! - `templates/<story>.<owner-hash>.template.toml`

use crate::records::{GalleryStore, StoryStore, TemplateStore};
use fable_core::{
    ColoringTemplate, ContentHash, GalleryEntry, OwnerId, Result, Story, StoryId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Record store backed by a directory of TOML files
pub struct TomlRecordStore {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct StoryFile {
    story: Story,
}

#[derive(Serialize, Deserialize)]
struct GalleryFile {
    gallery: GalleryEntry,
}

#[derive(Serialize, Deserialize)]
struct TemplateFile {
    template: ColoringTemplate,
}

impl TomlRecordStore {
    /// Create a new record store at the given root directory
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn story_path(&self, id: &StoryId) -> PathBuf {
        self.root.join("stories").join(format!("{}.story.toml", id))
    }

    fn pair_path(&self, dir: &str, story_id: &StoryId, owner: &OwnerId, ext: &str) -> PathBuf {
        // Owner names are free text, so only their hash goes into file names
        let owner_slug = ContentHash::from_bytes(owner.as_str().as_bytes()).to_hex();
        self.root
            .join(dir)
            .join(format!("{}.{}.{}.toml", story_id, owner_slug, ext))
    }

    fn write<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(value)?;

        // Readers never observe a half-written record
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&content)?))
    }
}

impl StoryStore for TomlRecordStore {
    fn find(&self, id: &StoryId) -> Result<Option<Story>> {
        Ok(Self::read::<StoryFile>(&self.story_path(id))?.map(|f| f.story))
    }

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<Story>> {
        let dir = self.root.join("stories");
        let mut stories = Vec::new();

        if !dir.exists() {
            return Ok(stories);
        }

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".story.toml"))
                .unwrap_or(false)
            {
                let content = fs::read_to_string(&path)?;
                if let Ok(file) = toml::from_str::<StoryFile>(&content) {
                    if file.story.is_owned_by(owner) {
                        stories.push(file.story);
                    }
                }
            }
        }

        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stories)
    }

    fn save(&self, story: &Story) -> Result<Story> {
        Self::write(&self.story_path(&story.id), &StoryFile { story: story.clone() })?;
        Ok(story.clone())
    }

    fn delete(&self, id: &StoryId) -> Result<bool> {
        let path = self.story_path(id);
        if path.exists() {
            fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl GalleryStore for TomlRecordStore {
    fn find_entry(&self, story_id: &StoryId, owner: &OwnerId) -> Result<Option<GalleryEntry>> {
        let path = self.pair_path("gallery", story_id, owner, "gallery");
        Ok(Self::read::<GalleryFile>(&path)?.map(|f| f.gallery))
    }

    fn save_entry(&self, entry: &GalleryEntry) -> Result<()> {
        let path = self.pair_path("gallery", &entry.story_id, &entry.owner, "gallery");
        Self::write(&path, &GalleryFile { gallery: entry.clone() })
    }
}

impl TemplateStore for TomlRecordStore {
    fn find_template(
        &self,
        story_id: &StoryId,
        owner: &OwnerId,
    ) -> Result<Option<ColoringTemplate>> {
        let path = self.pair_path("templates", story_id, owner, "template");
        Ok(Self::read::<TemplateFile>(&path)?.map(|f| f.template))
    }

    fn save_template(&self, template: &ColoringTemplate) -> Result<()> {
        let path = self.pair_path("templates", &template.story_id, &template.owner, "template");
        Self::write(&path, &TemplateFile { template: template.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fable_records_test_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn story(owner: &str) -> Story {
        Story::new(OwnerId::new(owner), "sea", "sea fairy tale", "A whale sang.")
    }

    #[test]
    fn test_story_save_find_delete() {
        let dir = temp_dir();
        let store = TomlRecordStore::new(&dir);

        let mut s = story("mina");
        s.image_url = Some("https://cdn/story-images/a.png".to_string());
        store.save(&s).unwrap();

        let loaded = store.find(&s.id).unwrap().unwrap();
        assert_eq!(loaded, s);

        assert!(store.delete(&s.id).unwrap());
        assert!(store.find(&s.id).unwrap().is_none());
        assert!(!store.delete(&s.id).unwrap());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_list_by_owner() {
        let dir = temp_dir();
        let store = TomlRecordStore::new(&dir);

        store.save(&story("mina")).unwrap();
        store.save(&story("mina")).unwrap();
        store.save(&story("joon")).unwrap();

        assert_eq!(store.list_by_owner(&OwnerId::new("mina")).unwrap().len(), 2);
        assert_eq!(store.list_by_owner(&OwnerId::new("joon")).unwrap().len(), 1);
        assert!(store.list_by_owner(&OwnerId::new("nobody")).unwrap().is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_gallery_and_template_keyed_by_owner() {
        let dir = temp_dir();
        let store = TomlRecordStore::new(&dir);
        let s = story("mina/../../x");

        let entry = GalleryEntry {
            story_id: s.id,
            owner: s.owner.clone(),
            story_title: s.title.clone(),
            color_image_url: Some("https://cdn/a.png".to_string()),
            child_name: "our child".to_string(),
            created_at: Utc::now(),
            updated_at: None,
        };
        store.save_entry(&entry).unwrap();
        assert_eq!(store.find_entry(&s.id, &s.owner).unwrap(), Some(entry));
        assert!(store.find_entry(&s.id, &OwnerId::new("joon")).unwrap().is_none());

        let template = ColoringTemplate {
            id: "t-1".to_string(),
            story_id: s.id,
            owner: s.owner.clone(),
            title: "sea fairy tale coloring".to_string(),
            original_url: "https://cdn/a.png".to_string(),
            bw_url: "https://cdn/b.png".to_string(),
            created_at: Utc::now(),
        };
        store.save_template(&template).unwrap();
        assert_eq!(store.find_template(&s.id, &s.owner).unwrap(), Some(template));

        fs::remove_dir_all(&dir).ok();
    }
}
