pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::adapters::{FileMetadataStore, LocalByteStore};
#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::{ScanConfig, TomlConfig};
pub use crate::core::orchestrator::{Framing, Upload, UploadOrchestrator, UploadState, UploadStream};
pub use crate::core::scanner::{scan_source, ScanSummary};
pub use crate::domain::model::{
    AnalysisReport, AnalysisResult, EventStatus, FileFormat, FilePage, FileQuery, ProgressEvent,
    SourceFile,
};
pub use crate::utils::error::{Result, ScanError};
