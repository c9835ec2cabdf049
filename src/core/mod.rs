pub mod delimited;
pub mod emitter;
pub mod orchestrator;
pub mod records;
pub mod scanner;
pub mod source;
pub mod spreadsheet;

pub use crate::domain::model::{AnalysisResult, ProgressEvent, SourceFile};
pub use crate::domain::ports::{ByteStore, MetadataStore};
pub use crate::utils::error::Result;
