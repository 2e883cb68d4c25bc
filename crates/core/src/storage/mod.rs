//! On-disk layout of published files.
//!
//! Every (artifact, variation) pair has one canonical path. Jobs write into a
//! temporary sibling of that path and publish with a single rename, so a
//! reader either sees the previous complete file or the new complete file.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::artifact::Artifact;
use crate::catalog::VariationDefinition;

/// Directory name used for originals.
pub const ORIGINAL_DIR: &str = "original";

/// Derives canonical and temporary paths under a storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    temp_suffix: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_suffix: "processing".to_string(),
        }
    }

    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<variation or "original">/<artifact id>.<ext>`, with the
    /// extension taken from the variation's MIME type (or the original's).
    pub fn canonical_path(
        &self,
        artifact: &Artifact,
        variation: Option<&VariationDefinition>,
    ) -> PathBuf {
        let (dir, mime) = match variation {
            Some(v) => (v.name.as_str(), v.mime_type.as_str()),
            None => (ORIGINAL_DIR, artifact.mime_type.as_str()),
        };
        self.root
            .join(dir)
            .join(format!("{}.{}", artifact.id, extension_for_mime(mime)))
    }

    /// A path next to `canonical` that only the given job writes to.
    ///
    /// Same directory keeps the final rename on one filesystem; the original
    /// extension is kept so tools that sniff the output format by name work.
    pub fn temp_path(
        &self,
        canonical: &Path,
        artifact_id: &str,
        variation: Option<&str>,
        processor: &str,
        job_id: &str,
    ) -> PathBuf {
        let ext = canonical
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let job_tag: String = job_id.chars().filter(|c| *c != '-').take(8).collect();
        let file_name = format!(
            ".{}-{}-{}-{}.{}.{}",
            artifact_id,
            variation.unwrap_or(ORIGINAL_DIR),
            processor,
            job_tag,
            self.temp_suffix,
            ext
        );
        match canonical.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

/// A file is ready when it exists and is non-empty.
pub async fn is_ready(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Atomically replace `canonical` with `temp`.
pub async fn publish(temp: &Path, canonical: &Path) -> Result<(), std::io::Error> {
    match fs::rename(temp, canonical).await {
        Ok(()) => Ok(()),
        // Cross-filesystem moves fail with EXDEV (18 on Linux)
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) => {
            debug!(temp = %temp.display(), canonical = %canonical.display(), "Rename crossed devices, staging a copy");
            let mut staged = canonical.as_os_str().to_owned();
            staged.push(".staged");
            let staged = PathBuf::from(staged);
            fs::copy(temp, &staged).await?;
            fs::rename(&staged, canonical).await?;
            fs::remove_file(temp).await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Remove a file, treating "not found" as success. Returns whether a file was removed.
pub async fn remove_if_exists(path: &Path) -> Result<bool, std::io::Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// File extension used for a MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/x-flv" => "flv",
        "video/x-f4v" => "f4v",
        "video/quicktime" => "mov",
        "application/zip" | "application/x-zip-compressed" => "zip",
        "application/x-rar-compressed" | "application/vnd.rar" => "rar",
        "application/x-7z-compressed" => "7z",
        "application/x-visual-pinball-table" => "vpt",
        "application/x-visual-pinball-table-x" => "vpx",
        "application/x-directb2s" => "directb2s",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ArtifactType, Derivation};
    use tempfile::TempDir;

    fn medium() -> VariationDefinition {
        VariationDefinition::new("medium", "image/jpeg", 10, Derivation::Square { size: 10 })
    }

    #[test]
    fn test_canonical_paths() {
        let layout = StorageLayout::new("/srv/media");
        let artifact = Artifact::new("abc", ArtifactType::Backglass, "image/png", 1);

        assert_eq!(
            layout.canonical_path(&artifact, None),
            PathBuf::from("/srv/media/original/abc.png")
        );
        assert_eq!(
            layout.canonical_path(&artifact, Some(&medium())),
            PathBuf::from("/srv/media/medium/abc.jpg")
        );
    }

    #[test]
    fn test_temp_path_is_sibling_and_unique_per_job() {
        let layout = StorageLayout::new("/srv/media");
        let canonical = PathBuf::from("/srv/media/medium/abc.jpg");

        let a = layout.temp_path(&canonical, "abc", Some("medium"), "image-variation", "1111-aaaa");
        let b = layout.temp_path(&canonical, "abc", Some("medium"), "image-variation", "2222-bbbb");

        assert_ne!(a, b);
        assert_eq!(a.parent(), canonical.parent());
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("jpg"));
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".abc-medium-image-variation-"));
        assert!(name.contains(".processing."));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("video/mp4; codecs=avc1"), "mp4");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }

    #[tokio::test]
    async fn test_is_ready_requires_non_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.jpg");

        assert!(!is_ready(&path).await);

        fs::write(&path, b"").await.unwrap();
        assert!(!is_ready(&path).await);

        fs::write(&path, b"data").await.unwrap();
        assert!(is_ready(&path).await);

        assert!(!is_ready(dir.path()).await);
    }

    #[tokio::test]
    async fn test_publish_replaces_canonical() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().join("abc.jpg");
        let temp = dir.path().join(".abc.processing.jpg");

        fs::write(&canonical, b"old").await.unwrap();
        fs::write(&temp, b"new content").await.unwrap();

        publish(&temp, &canonical).await.unwrap();

        assert_eq!(fs::read(&canonical).await.unwrap(), b"new content");
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.jpg");
        assert!(!remove_if_exists(&path).await.unwrap());
        fs::write(&path, b"x").await.unwrap();
        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!path.exists());
    }
}
