use crate::domain::model::{AnalysisResult, FilePage, FileQuery, FileRecord, NewFileRecord};
use crate::domain::ports::MetadataStore;
use crate::utils::error::{Result, ScanError};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    next_id: i64,
    files: Vec<FileRecord>,
}

/// File metadata kept in a single JSON document. Without a path the
/// catalog lives only in memory.
pub struct FileMetadataStore {
    path: Option<PathBuf>,
    catalog: Mutex<Catalog>,
}

impl FileMetadataStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            catalog: Mutex::new(Catalog::default()),
        }
    }

    /// Opens the catalog at `path`, starting empty when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let catalog = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ScanError::persistence(format!(
                    "Corrupt metadata catalog {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Catalog::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            catalog: Mutex::new(catalog),
        })
    }

    async fn flush(&self, catalog: &Catalog) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(catalog)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| ScanError::persistence(format!("Failed to write catalog: {}", e)))
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn create(&self, record: NewFileRecord) -> Result<FileRecord> {
        let mut catalog = self.catalog.lock().await;
        let id = catalog.next_id + 1;
        let created = FileRecord::from_new(id, record, Utc::now());

        catalog.files.push(created.clone());
        catalog.next_id = id;

        if let Err(e) = self.flush(&catalog).await {
            catalog.files.pop();
            catalog.next_id = id - 1;
            return Err(e);
        }

        tracing::debug!("Created metadata record {} ({})", id, created.file_reference);
        Ok(created)
    }

    async fn update(&self, id: i64, result: &AnalysisResult) -> Result<FileRecord> {
        let mut catalog = self.catalog.lock().await;
        let position = catalog
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| ScanError::persistence(format!("No file record with id {}", id)))?;

        let previous = catalog.files[position].clone();
        catalog.files[position].apply_analysis(result, Utc::now());

        if let Err(e) = self.flush(&catalog).await {
            catalog.files[position] = previous;
            return Err(e);
        }

        Ok(catalog.files[position].clone())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let catalog = self.catalog.lock().await;
        Ok(catalog.files.iter().find(|f| f.id == id).cloned())
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<FileRecord>> {
        let catalog = self.catalog.lock().await;
        Ok(catalog
            .files
            .iter()
            .find(|f| f.file_reference == reference)
            .cloned())
    }

    async fn list(&self, query: &FileQuery) -> Result<FilePage> {
        let catalog = self.catalog.lock().await;
        let matching: Vec<&FileRecord> =
            catalog.files.iter().filter(|f| query.matches(f)).collect();
        let total = matching.len() as u64;
        let files = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(FilePage::new(files, total, query))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut catalog = self.catalog.lock().await;
        let Some(position) = catalog.files.iter().position(|f| f.id == id) else {
            return Ok(false);
        };

        let removed = catalog.files.remove(position);
        if let Err(e) = self.flush(&catalog).await {
            catalog.files.insert(position, removed);
            return Err(e);
        }

        tracing::debug!("Deleted metadata record {} ({})", id, removed.file_reference);
        Ok(true)
    }
}
