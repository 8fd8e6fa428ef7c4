//! Filesystem-backed object storage
//!
//! Objects live at `<root>/<key>` and are published under `<public_url>/<key>`,
//! mirroring a bucket fronted by a CDN.

use crate::object::{build_key, Category, ObjectStore};
use chrono::Utc;
use fable_core::{ContentHash, FableError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// Object store that keeps objects in a local directory tree
pub struct FsObjectStore {
    root: PathBuf,
    public_url: Url,
    presign_secret: String,
}

impl FsObjectStore {
    /// Create a store rooted at `root`, publishing objects under `public_url`
    pub fn new<P: AsRef<Path>>(root: P, public_url: &str, presign_secret: &str) -> Result<Self> {
        let mut public_url = Url::parse(public_url).map_err(|e| {
            FableError::ConfigError(format!("Invalid storage public_url '{}': {}", public_url, e))
        })?;
        if !public_url.path().ends_with('/') {
            let path = format!("{}/", public_url.path());
            public_url.set_path(&path);
        }

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            public_url,
            presign_secret: presign_secret.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check a presigned URL's signature and expiry
    pub fn verify_presigned(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(key) = self.extract_key(url) else {
            return false;
        };

        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        match (expires, signature) {
            (Some(expires), Some(signature)) => {
                expires >= Utc::now().timestamp() && signature == self.sign(&key, expires)
            }
            _ => false,
        }
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        ContentHash::from_parts(&[
            self.presign_secret.as_bytes(),
            b"\n",
            key.as_bytes(),
            b"\n",
            expires.to_string().as_bytes(),
        ])
        .to_hex()
    }

    /// Map a key to its on-disk location, refusing keys that escape the root
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !well_formed {
            return Err(FableError::UnsafePath(relative.to_path_buf()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn upload(&self, local_path: &Path, category: Category) -> Result<String> {
        if !local_path.is_file() {
            return Err(FableError::AssetNotFound(local_path.to_path_buf()));
        }

        let ext = local_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let identifier = Uuid::new_v4().simple().to_string();
        let key = build_key(category, Utc::now(), &identifier, ext);

        self.upload_with_key(local_path, &key)
    }

    fn upload_with_key(&self, local_path: &Path, key: &str) -> Result<String> {
        if !self.is_available() {
            return Err(FableError::StorageUnavailable(format!(
                "Storage root {} is not writable",
                self.root.display()
            )));
        }
        if !local_path.is_file() {
            return Err(FableError::AssetNotFound(local_path.to_path_buf()));
        }

        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FableError::StorageUploadFailed(format!("{}: {}", key, e))
            })?;
        }
        fs::copy(local_path, &dest)
            .map_err(|e| FableError::StorageUploadFailed(format!("{}: {}", key, e)))?;

        tracing::debug!(key = %key, "stored object");
        Ok(self.url_for(key))
    }

    fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            return Err(FableError::RecordNotFound(format!("object {}", key)));
        }
        Ok(fs::read(path)?)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        if path.is_file() {
            fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, url: &str) -> bool {
        self.extract_key(url)
            .and_then(|key| self.object_path(&key).ok())
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn extract_key(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != self.public_url.scheme()
            || parsed.host_str() != self.public_url.host_str()
            || parsed.port_or_known_default() != self.public_url.port_or_known_default()
        {
            return None;
        }

        let key = parsed.path().strip_prefix(self.public_url.path())?;
        if key.is_empty() {
            return None;
        }
        self.object_path(key).ok()?;
        Some(key.to_string())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.public_url, key.trim_start_matches('/'))
    }

    fn presign(&self, key: &str, ttl_minutes: u32) -> Result<String> {
        self.object_path(key)?;
        let expires = Utc::now().timestamp() + i64::from(ttl_minutes) * 60;
        Ok(format!(
            "{}?expires={}&signature={}",
            self.url_for(key),
            expires,
            self.sign(key, expires)
        ))
    }

    fn is_available(&self) -> bool {
        fs::create_dir_all(&self.root).is_ok() && self.root.is_dir()
    }
}
