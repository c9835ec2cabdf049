use crate::domain::model::{AnalysisResult, FilePage, FileQuery, FileRecord, NewFileRecord};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Raw byte storage for uploaded files.
pub trait ByteStore: Send + Sync {
    fn put(&self, key: &str, data: &[u8]) -> impl std::future::Future<Output = Result<()>> + Send;
    fn delete(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Where `key` lives, as recorded in file metadata.
    fn location(&self, key: &str) -> String;
}

/// Relational metadata for stored uploads.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create(&self, record: NewFileRecord) -> Result<FileRecord>;
    async fn update(&self, id: i64, result: &AnalysisResult) -> Result<FileRecord>;
    async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>>;
    async fn get_by_reference(&self, reference: &str) -> Result<Option<FileRecord>>;

    /// Records matching `query.search`, in creation order, one page at a time.
    async fn list(&self, query: &FileQuery) -> Result<FilePage>;

    /// Removes the record; `false` when no record has that id.
    async fn delete(&self, id: i64) -> Result<bool>;
}
