use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("File contains no data rows")]
    EmptyFileError,

    #[error("Structural error: {message}")]
    StructuralError { message: String },

    #[error("Analysis error: {message}")]
    AnalysisError { message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("File with reference '{reference}' not found")]
    NotFoundError { reference: String },

    #[error("File '{reference}' has not been analyzed yet")]
    NotAnalyzedError { reference: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Io,
    Persistence,
    Parse,
    Analysis,
    Config,
    Lookup,
}

impl ScanError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceError {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    pub fn analysis(message: impl Into<String>) -> Self {
        Self::AnalysisError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError { .. } => ErrorCategory::Validation,
            Self::IoError(_) => ErrorCategory::Io,
            Self::PersistenceError { .. } => ErrorCategory::Persistence,
            Self::ParseError { .. }
            | Self::EmptyFileError
            | Self::StructuralError { .. }
            | Self::CsvError(_) => ErrorCategory::Parse,
            Self::AnalysisError { .. } | Self::SerializationError(_) => ErrorCategory::Analysis,
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                ErrorCategory::Config
            }
            Self::NotFoundError { .. } | Self::NotAnalyzedError { .. } => ErrorCategory::Lookup,
        }
    }

    /// Message shown to clients in terminal error events.
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ValidationError { message } => message.clone(),
            Self::IoError(e) => format!(
                "Error occurred while saving file to storage: {}. Please try again or contact support if the issue persists.",
                e
            ),
            Self::PersistenceError { message } => format!(
                "Database operation failed while storing file metadata: {}. The file has been removed from storage. Please try again.",
                message
            ),
            Self::ParseError { .. }
            | Self::EmptyFileError
            | Self::StructuralError { .. }
            | Self::CsvError(_)
            | Self::AnalysisError { .. }
            | Self::SerializationError(_) => format!(
                "Data analysis encountered an error: {}. The file has been uploaded but analysis could not be completed. Please review the file format and try again.",
                self
            ),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
