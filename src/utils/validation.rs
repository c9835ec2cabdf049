use crate::domain::model::{FileFormat, FileQuery, MAX_PAGE_LIMIT};
use crate::utils::error::{Result, ScanError};
use std::path::Path;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ScanError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// Checks the declared upload filename and resolves the format from its
/// extension (case-insensitive).
pub fn validate_upload_filename(filename: Option<&str>) -> Result<FileFormat> {
    let filename = match filename.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ScanError::validation("Filename is required")),
    };

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref().and_then(FileFormat::from_extension) {
        Some(format) => Ok(format),
        None => {
            let received = extension
                .map(|ext| format!(".{}", ext))
                .unwrap_or_else(|| "no extension".to_string());
            Err(ScanError::validation(format!(
                "Only {} files are allowed. Received: {}",
                FileFormat::supported_list(),
                received
            )))
        }
    }
}

pub fn validate_file_size(file_size: u64, max_file_size: u64) -> Result<()> {
    if file_size > max_file_size {
        let max_mb = max_file_size as f64 / (1024.0 * 1024.0);
        let size_mb = file_size as f64 / (1024.0 * 1024.0);
        return Err(ScanError::validation(format!(
            "File size {:.2} MB exceeds maximum allowed size of {:.2} MB",
            size_mb, max_mb
        )));
    }
    Ok(())
}

impl Validate for FileQuery {
    fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(ScanError::validation("Page number must be at least 1"));
        }
        if self.limit < 1 || self.limit > MAX_PAGE_LIMIT {
            return Err(ScanError::validation(format!(
                "Items per page must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        Ok(())
    }
}
