//! Writing generated images to the output directory.

use crate::error::{GenStudioError, Result};
use crate::gallery::{Manifest, ManifestRecord};
use crate::image::{GeneratedImage, GenerationRequest, ImageProviderKind, ModelId};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

/// Prefix shared by every generated file name.
pub const FILE_PREFIX: &str = "generated_image_";

/// Attempts at finding an unused random suffix before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

/// An image persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredImage {
    /// Location of the image file.
    pub path: PathBuf,
    /// Model that produced it.
    pub model: ModelId,
    /// Provider that produced it.
    pub provider: ImageProviderKind,
    /// Prompt it was generated from.
    pub prompt: String,
    /// When it was written.
    pub created_at: DateTime<Utc>,
    /// Size of the file in bytes.
    pub size_bytes: usize,
}

/// Replaces characters that are unsafe in file names with `-`.
pub fn sanitize_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}

/// Builds `generated_image_<date>_<suffix>_<model>.<ext>`.
pub fn image_file_name(date: NaiveDate, suffix: u16, model: &str, extension: &str) -> String {
    format!(
        "{}{}_{:04}_{}.{}",
        FILE_PREFIX,
        date.format("%Y-%m-%d"),
        suffix,
        sanitize_model_name(model),
        extension
    )
}

/// Output directory plus its sidecar manifest.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    manifest: Manifest,
}

impl ImageStore {
    /// Opens (and creates if needed) the output directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let manifest = Manifest::in_dir(&dir);
        Ok(Self { dir, manifest })
    }

    /// Sidecar manifest for this directory.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Writes the image under a fresh file name and records it in the manifest.
    ///
    /// The file is created with create-new semantics so an existing image is
    /// never overwritten; a failed write removes the partial file.
    pub fn save(&self, image: &GeneratedImage, request: &GenerationRequest) -> Result<StoredImage> {
        let created_at = Utc::now();
        let extension = image.format.extension();
        let mut rng = rand::thread_rng();

        let mut attempt = 0;
        let (path, mut file) = loop {
            let suffix: u16 = rng.gen_range(1000..=9999);
            let name = image_file_name(
                created_at.date_naive(),
                suffix,
                request.model.as_str(),
                extension,
            );
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    if attempt >= MAX_NAME_ATTEMPTS {
                        return Err(GenStudioError::Io(e));
                    }
                    tracing::debug!(file = %name, "file name taken, re-rolling suffix");
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = file.write_all(&image.data).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let appended = self.manifest.append(&ManifestRecord {
            file: file_name,
            model: request.model.as_str().to_string(),
            provider: image.provider,
            prompt: request.prompt.clone(),
            aspect_ratio: request.aspect_ratio,
            created_at,
            size_bytes: image.size(),
            duration_ms: image.metadata.duration_ms,
            seed: image.metadata.seed,
        });
        if let Err(e) = appended {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        tracing::debug!(path = %path.display(), size_bytes = image.size(), "stored image");

        Ok(StoredImage {
            path,
            model: request.model,
            provider: image.provider,
            prompt: request.prompt.clone(),
            created_at,
            size_bytes: image.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{AspectRatio, GenerationMetadata, ImageFormat};

    fn png_image(provider: ImageProviderKind) -> GeneratedImage {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(b"fake image body");
        GeneratedImage::new(
            data,
            ImageFormat::Png,
            provider,
            GenerationMetadata {
                model: None,
                seed: Some(7),
                duration_ms: Some(1200),
            },
        )
    }

    #[test]
    fn test_image_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            image_file_name(date, 4821, "sd3.5-large", "png"),
            "generated_image_2024-03-09_4821_sd3.5-large.png"
        );
    }

    #[test]
    fn test_sanitize_model_name() {
        assert_eq!(sanitize_model_name("fal-ai/flux/dev"), "fal-ai-flux-dev");
        assert_eq!(sanitize_model_name("a b:c\\d"), "a-b-c-d");
        assert_eq!(sanitize_model_name("flux-1.1-pro"), "flux-1.1-pro");
    }

    #[test]
    fn test_save_writes_bytes_and_manifest() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::open(temp.path().join("images"))?;
        let image = png_image(ImageProviderKind::Fal);
        let request = GenerationRequest::new("A red fox", ModelId::FluxDev)
            .with_aspect_ratio(AspectRatio::Landscape);

        let stored = store.save(&image, &request)?;

        assert_eq!(std::fs::read(&stored.path)?, image.data);
        assert_eq!(stored.model, ModelId::FluxDev);
        assert_eq!(stored.size_bytes, image.size());
        let name = stored.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(FILE_PREFIX));
        assert!(name.ends_with("_flux-dev.png"));

        let records = store.manifest().read()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, name);
        assert_eq!(records[0].prompt, "A red fox");
        assert_eq!(records[0].seed, Some(7));
        assert_eq!(records[0].aspect_ratio, AspectRatio::Landscape);
        Ok(())
    }

    #[test]
    fn test_manifest_failure_removes_image() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::open(temp.path())?;
        // A directory where the manifest file should be makes appends fail
        std::fs::create_dir(store.manifest().path())?;

        let result = store.save(
            &png_image(ImageProviderKind::Stability),
            &GenerationRequest::new("A red fox", ModelId::Sd3Medium),
        );

        assert!(result.is_err());
        let images: Vec<_> = std::fs::read_dir(temp.path())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(FILE_PREFIX))
            .collect();
        assert!(images.is_empty());
        Ok(())
    }

    #[test]
    fn test_repeated_saves_never_overwrite() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::open(temp.path())?;
        let image = png_image(ImageProviderKind::Stability);
        let request = GenerationRequest::new("A red fox", ModelId::Sd3Medium);

        let mut paths = Vec::new();
        for _ in 0..5 {
            paths.push(store.save(&image, &request)?.path);
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 5);
        assert_eq!(store.manifest().read()?.len(), 5);
        Ok(())
    }
}
