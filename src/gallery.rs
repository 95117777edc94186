//! Gallery reconstruction and the `gallery.jsonl` sidecar manifest.

use crate::error::{GenStudioError, Result};
use crate::image::{AspectRatio, ImageProviderKind};
use crate::store::FILE_PREFIX;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Sidecar manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "gallery.jsonl";

/// Extensions listed by the gallery.
const GALLERY_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One line of `gallery.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Image file name, relative to the output directory.
    pub file: String,
    /// Model identifier.
    pub model: String,
    /// Provider that produced the image.
    pub provider: ImageProviderKind,
    /// Prompt used.
    pub prompt: String,
    /// Requested aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// Write time.
    pub created_at: DateTime<Utc>,
    /// Bytes written.
    pub size_bytes: usize,
    /// Provider-side generation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Seed reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Append-only `gallery.jsonl` writer and reader.
///
/// One compact JSON object per line. Appends are serialized so concurrent
/// generations never interleave partial lines.
#[derive(Debug, Clone)]
pub struct Manifest {
    inner: Arc<ManifestInner>,
}

#[derive(Debug)]
struct ManifestInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Manifest {
    /// Manifest stored at `<dir>/gallery.jsonl`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            inner: Arc::new(ManifestInner {
                path: dir.join(MANIFEST_FILE),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Appends one record.
    pub fn append(&self, record: &ManifestRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| GenStudioError::Io(std::io::Error::other("manifest lock poisoned")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Reads every well-formed record. Malformed lines are skipped with a warning.
    pub fn read(&self) -> Result<Vec<ManifestRecord>> {
        let content = match std::fs::read_to_string(&self.inner.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %self.inner.path.display(),
                    line = index + 1,
                    "skipping malformed gallery record: {e}"
                ),
            }
        }
        Ok(records)
    }
}

/// An image listed in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryEntry {
    /// Full path to the image.
    pub path: PathBuf,
    /// File name within the output directory.
    pub file_name: String,
    /// Model, from the sidecar record or recovered from the file name.
    pub model: Option<String>,
    /// Prompt, when a sidecar record exists.
    pub prompt: Option<String>,
    /// Write time, when a sidecar record exists.
    pub created_at: Option<DateTime<Utc>>,
}

/// Lists the images in `dir`, newest file name first.
///
/// Only `.png`, `.jpg` and `.jpeg` files are listed. A missing directory is an
/// empty gallery.
pub fn load(dir: &Path) -> Result<Vec<GalleryEntry>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_gallery_image(&name) {
            names.push(name);
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));

    let mut records: HashMap<String, ManifestRecord> = Manifest::in_dir(dir)
        .read()?
        .into_iter()
        .map(|record| (record.file.clone(), record))
        .collect();

    Ok(names
        .into_iter()
        .map(|file_name| {
            let path = dir.join(&file_name);
            match records.remove(&file_name) {
                Some(record) => GalleryEntry {
                    path,
                    file_name,
                    model: Some(record.model),
                    prompt: Some(record.prompt),
                    created_at: Some(record.created_at),
                },
                None => GalleryEntry {
                    path,
                    model: model_from_file_name(&file_name),
                    file_name,
                    prompt: None,
                    created_at: None,
                },
            }
        })
        .collect())
}

fn is_gallery_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            GALLERY_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Recovers the model from `generated_image_<YYYY-MM-DD>_<NNNN>_<model>.<ext>`.
///
/// Used for images without a sidecar record. Everything between the suffix
/// and the last `.` is the model, so names containing `_` or `.` survive.
pub fn model_from_file_name(file_name: &str) -> Option<String> {
    let rest = file_name.strip_prefix(FILE_PREFIX)?;
    let (stem, _ext) = rest.rsplit_once('.')?;

    let mut parts = stem.splitn(3, '_');
    let date = parts.next()?;
    let suffix = parts.next()?;
    let model = parts.next()?;

    let date_ok = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok();
    let suffix_ok = suffix.len() == 4 && suffix.chars().all(|c| c.is_ascii_digit());
    if !date_ok || !suffix_ok || model.is_empty() {
        return None;
    }
    Some(model.to_string())
}
