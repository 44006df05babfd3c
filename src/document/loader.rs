use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::AssistantError;

/// Text of one source file, identified by its file name.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub path: Option<PathBuf>,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            text: text.into(),
            ingested_at: Utc::now(),
        }
    }

    /// Content hash used to tell whether a file changed since it was indexed.
    pub fn fingerprint(&self) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.text.as_bytes()).to_string()
    }
}

/// Finds the PDFs in the notes folder and pulls their text out.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    folder: PathBuf,
}

impl DocumentLoader {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self { folder: folder.into() }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Supported files directly inside the folder, sorted by file name.
    pub async fn discover(&self) -> Result<Vec<PathBuf>, AssistantError> {
        let not_found = || AssistantError::NotFound { path: self.folder.clone() };

        let metadata = tokio::fs::metadata(&self.folder).await.map_err(|_| not_found())?;
        if !metadata.is_dir() {
            return Err(not_found());
        }

        let mut entries = tokio::fs::read_dir(&self.folder).await.map_err(|_| not_found())?;
        let mut documents = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(|_| not_found())? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && is_supported(&path) {
                documents.push(path);
            }
        }

        if documents.is_empty() {
            return Err(AssistantError::EmptyCorpus { path: self.folder.clone() });
        }

        documents.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
        log::info!("Found {} documents in {}", documents.len(), self.folder.display());
        Ok(documents)
    }

    /// Extracts and normalises the text of one PDF. Extraction is CPU bound
    /// and runs on the blocking pool.
    pub async fn load(&self, path: &Path) -> Result<Document, AssistantError> {
        let id = document_id(path);
        let owned = path.to_path_buf();

        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
            .await
            .map_err(|e| AssistantError::Extraction {
                document: id.clone(),
                message: format!("extractor crashed: {}", e),
            })?
            .map_err(|e| AssistantError::Extraction {
                document: id.clone(),
                message: format!("{:?}", e),
            })?;

        Ok(Document {
            id,
            path: Some(path.to_path_buf()),
            text: normalize_text(&extracted),
            ingested_at: Utc::now(),
        })
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

pub fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Drops carriage returns and NULs, squeezes runs of blank lines down to one
/// empty line and trims the ends.
pub fn normalize_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut newlines = 0;

    for c in raw.chars() {
        match c {
            '\r' | '\0' => {}
            '\n' => {
                newlines += 1;
                if newlines <= 2 {
                    text.push('\n');
                }
            }
            _ => {
                newlines = 0;
                text.push(c);
            }
        }
    }

    text.trim().to_string()
}
