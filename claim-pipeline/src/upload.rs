use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use crate::error::{ClaimError, Result};

const FALLBACK_NAME: &str = "invoice.pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Reduces an uploaded file name to its last path component and to
/// alphanumerics, spaces, `.`, `_` and `-`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let kept: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect();

    // no hidden files, no `..`
    let cleaned = kept.trim_end().trim_start_matches('.').trim_start();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Writes uploaded invoices under one directory, each under a fresh
/// `<uuid>_<sanitized name>` so equal names never collide.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn persist(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ClaimError::FileWrite {
                path: self.dir.clone(),
                source,
            })?;

        let file_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name));
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ClaimError::FileWrite {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), size = bytes.len(), "invoice upload saved");
        Ok(path)
    }
}
