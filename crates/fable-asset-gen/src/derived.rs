//! Black/white coloring variants of cover images
//!
//! A variant lives under the same key as its source image with only the
//! category segment swapped (`story-images/...` becomes `bw-images/...`), so
//! whether it exists can be answered by probing storage before converting.

use crate::paths::{PathPolicy, PathResolver};
use crate::service::{ConvertedImage, GenerationService};
use fable_core::{FableError, Result};
use fable_storage::{Category, ObjectStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key of the black/white variant for a cover image key
pub fn derive_key(primary_key: &str) -> Option<String> {
    let primary = format!("{}/", Category::StoryImages.prefix());
    primary_key
        .strip_prefix(primary.as_str())
        .filter(|rest| !rest.is_empty())
        .map(|rest| format!("{}/{}", Category::BwImages.prefix(), rest))
}

/// Where a black/white variant is expected to live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAsset {
    pub primary_key: String,
    pub derived_key: String,
    pub derived_url: String,
}

impl DerivedAsset {
    /// Predict the variant location for a cover image URL served by `store`
    pub fn predict(store: &dyn ObjectStore, primary_url: &str) -> Option<Self> {
        let primary_key = store.extract_key(primary_url)?;
        let derived_key = derive_key(&primary_key)?;
        let derived_url = store.url_for(&derived_key);
        Some(Self {
            primary_key,
            derived_key,
            derived_url,
        })
    }
}

/// Finds an existing black/white variant or builds one through the service
#[derive(Clone)]
pub struct DerivedAssetResolver {
    store: Arc<dyn ObjectStore>,
    service: Arc<dyn GenerationService>,
    resolver: PathResolver,
    policy: PathPolicy,
    scratch_dir: PathBuf,
}

impl DerivedAssetResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        service: Arc<dyn GenerationService>,
        resolver: PathResolver,
        policy: PathPolicy,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            service,
            resolver,
            policy,
            scratch_dir,
        }
    }

    /// URL of the black/white variant of `primary_url`
    ///
    /// Never fails: when the variant cannot be found or built the original
    /// URL comes back unchanged.
    pub fn find_or_build(&self, primary_url: &str) -> String {
        let Some(asset) = DerivedAsset::predict(self.store.as_ref(), primary_url) else {
            tracing::info!(url = %primary_url, "not a stored cover image, skipping conversion");
            return primary_url.to_string();
        };

        if self.store.exists(&asset.derived_url) {
            tracing::debug!(url = %asset.derived_url, "black/white variant already stored");
            return asset.derived_url;
        }
        if !self.store.is_available() {
            tracing::warn!(url = %primary_url, "storage unavailable, skipping conversion");
            return primary_url.to_string();
        }

        match self.build(&asset) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %primary_url, error = %e, "black/white conversion failed, keeping original");
                primary_url.to_string()
            }
        }
    }

    fn build(&self, asset: &DerivedAsset) -> Result<String> {
        let bytes = self.store.download(&asset.primary_key)?;
        std::fs::create_dir_all(&self.scratch_dir)?;

        let ext = Path::new(&asset.primary_key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let mut source = tempfile::Builder::new()
            .prefix("bw-source-")
            .suffix(&format!(".{}", ext))
            .tempfile_in(&self.scratch_dir)?;
        source.write_all(&bytes)?;
        source.flush()?;

        let converted = self
            .service
            .convert_bw(&source.path().to_string_lossy())?;
        let produced = self.materialize(converted)?;

        let url = self.store.upload_with_key(&produced, &asset.derived_key)?;
        tracing::info!(url = %url, "stored black/white variant");
        Ok(url)
    }

    /// Turn a conversion result into a validated local file that is deleted
    /// when the returned guard drops
    fn materialize(
        &self,
        converted: ConvertedImage,
    ) -> Result<scopeguard::ScopeGuard<PathBuf, fn(PathBuf)>> {
        let local = match converted {
            ConvertedImage::Path(raw) => {
                let resolved = self.resolver.resolve(&raw);
                if !resolved.exists() {
                    return Err(FableError::AssetNotFound(resolved));
                }
                self.policy.ensure_safe(&resolved)?
            }
            ConvertedImage::Inline(bytes) => {
                let path = self
                    .scratch_dir
                    .join(format!("bw-{}.png", uuid::Uuid::new_v4().simple()));
                std::fs::write(&path, bytes)?;
                let guard = scopeguard::guard(path, remove_quietly as fn(PathBuf));
                let checked = self.policy.ensure_safe(&guard)?;
                let _ = scopeguard::ScopeGuard::into_inner(guard);
                checked
            }
        };
        Ok(scopeguard::guard(local, remove_quietly as fn(PathBuf)))
    }
}

/// Best-effort removal of a local scratch file
pub(crate) fn remove_quietly(path: PathBuf) {
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete local file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::MockService;
    use fable_storage::FsObjectStore;
    use std::fs;

    const PUBLIC: &str = "https://fable-assets.s3.amazonaws.com";
    const PRIMARY_KEY: &str = "story-images/2025/06/13/image-6cb8f206.png";

    struct Fixture {
        dir: PathBuf,
        store: Arc<FsObjectStore>,
        service: Arc<MockService>,
        resolver: DerivedAssetResolver,
    }

    fn fixture(service: MockService) -> Fixture {
        let dir = std::env::temp_dir().join(format!("fable_derived_test_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let store = Arc::new(FsObjectStore::new(dir.join("objects"), PUBLIC, "secret").unwrap());
        let service = Arc::new(service);
        let resolver = DerivedAssetResolver::new(
            store.clone(),
            service.clone(),
            PathResolver::with_roots(vec![dir.clone()]),
            PathPolicy::default(),
            dir.join("scratch"),
        );
        Fixture {
            dir,
            store,
            service,
            resolver,
        }
    }

    fn mock(dir_name: &str) -> MockService {
        MockService::new(std::env::temp_dir().join(format!("{}_{}", dir_name, uuid::Uuid::new_v4())))
    }

    fn store_png(f: &Fixture, key: &str) -> String {
        let local = f.dir.join("upload.png");
        image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 40, 40, 255]))
            .save(&local)
            .unwrap();
        f.store.upload_with_key(&local, key).unwrap()
    }

    #[test]
    fn test_derive_key_swaps_prefix_only() {
        assert_eq!(
            derive_key(PRIMARY_KEY).as_deref(),
            Some("bw-images/2025/06/13/image-6cb8f206.png")
        );
        assert_eq!(derive_key("voices/2025/06/13/voice-a.mp3"), None);
        assert_eq!(derive_key("story-images/"), None);
        assert_eq!(
            derive_key("story-images/a/story-images/b.png").as_deref(),
            Some("bw-images/a/story-images/b.png")
        );
    }

    #[test]
    fn test_cache_hit_short_circuits() {
        let f = fixture(mock("fable_derived_mock"));
        let primary = store_png(&f, PRIMARY_KEY);
        let existing = store_png(&f, "bw-images/2025/06/13/image-6cb8f206.png");

        assert_eq!(f.resolver.find_or_build(&primary), existing);
        assert_eq!(f.service.calls().total(), 0);

        fs::remove_dir_all(&f.dir).ok();
        fs::remove_dir_all(f.service.output_dir()).ok();
    }

    #[test]
    fn test_cache_miss_builds_under_predicted_key() {
        let f = fixture(mock("fable_derived_mock"));
        let primary = store_png(&f, PRIMARY_KEY);

        let bw = f.resolver.find_or_build(&primary);
        assert_eq!(
            bw,
            "https://fable-assets.s3.amazonaws.com/bw-images/2025/06/13/image-6cb8f206.png"
        );
        assert!(f.store.exists(&bw));
        assert_eq!(f.service.calls().convert(), 1);

        // Scratch copies and the service's output are gone
        assert_eq!(fs::read_dir(f.dir.join("scratch")).unwrap().count(), 0);
        assert_eq!(fs::read_dir(f.service.output_dir()).unwrap().count(), 0);

        // Second request is a cache hit
        assert_eq!(f.resolver.find_or_build(&primary), bw);
        assert_eq!(f.service.calls().convert(), 1);

        fs::remove_dir_all(&f.dir).ok();
        fs::remove_dir_all(f.service.output_dir()).ok();
    }

    #[test]
    fn test_foreign_url_returned_unchanged() {
        let f = fixture(mock("fable_derived_mock"));
        let foreign = "https://picsum.photos/800/600?random=1";
        assert_eq!(f.resolver.find_or_build(foreign), foreign);
        assert_eq!(f.service.calls().total(), 0);
        fs::remove_dir_all(&f.dir).ok();
    }

    #[test]
    fn test_non_cover_storage_urls_returned_unchanged() {
        let f = fixture(mock("fable_derived_mock"));
        let voice = store_png(&f, "voices/2025/06/13/voice-a.png");
        let bw = store_png(&f, "bw-images/2025/06/13/image-6cb8f206.png");

        assert_eq!(f.resolver.find_or_build(&voice), voice);
        assert_eq!(f.resolver.find_or_build(&bw), bw);
        assert_eq!(f.service.calls().total(), 0);

        fs::remove_dir_all(&f.dir).ok();
    }

    /// Storage that answers lookups but reports itself unreachable
    struct OfflineStore(FsObjectStore);

    impl ObjectStore for OfflineStore {
        fn upload(&self, local_path: &Path, category: Category) -> Result<String> {
            self.0.upload(local_path, category)
        }
        fn upload_with_key(&self, local_path: &Path, key: &str) -> Result<String> {
            self.0.upload_with_key(local_path, key)
        }
        fn download(&self, key: &str) -> Result<Vec<u8>> {
            self.0.download(key)
        }
        fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key)
        }
        fn exists(&self, url: &str) -> bool {
            self.0.exists(url)
        }
        fn extract_key(&self, url: &str) -> Option<String> {
            self.0.extract_key(url)
        }
        fn url_for(&self, key: &str) -> String {
            self.0.url_for(key)
        }
        fn presign(&self, key: &str, ttl_minutes: u32) -> Result<String> {
            self.0.presign(key, ttl_minutes)
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_unavailable_storage_keeps_original() {
        let f = fixture(mock("fable_derived_mock"));
        let primary = store_png(&f, PRIMARY_KEY);

        let offline = DerivedAssetResolver::new(
            Arc::new(OfflineStore(
                FsObjectStore::new(f.store.root(), PUBLIC, "secret").unwrap(),
            )),
            f.service.clone(),
            PathResolver::with_roots(vec![f.dir.clone()]),
            PathPolicy::default(),
            f.dir.join("scratch"),
        );

        assert_eq!(offline.find_or_build(&primary), primary);
        assert_eq!(f.service.calls().total(), 0);
        assert!(!f.store.exists(&primary.replace("/story-images/", "/bw-images/")));

        fs::remove_dir_all(&f.dir).ok();
    }

    #[test]
    fn test_conversion_failure_keeps_original() {
        let f = fixture(mock("fable_derived_mock").with_conversion_failure());
        let primary = store_png(&f, PRIMARY_KEY);

        assert_eq!(f.resolver.find_or_build(&primary), primary);
        assert_eq!(f.service.calls().convert(), 1);
        assert_eq!(fs::read_dir(f.dir.join("scratch")).unwrap().count(), 0);

        fs::remove_dir_all(&f.dir).ok();
    }
}
