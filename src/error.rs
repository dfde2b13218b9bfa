//! Error types for brain-etl

use thiserror::Error;

/// Main error type for the Brain ETL pipeline
#[derive(Error, Debug)]
pub enum EtlError {
    /// A parsed file lacks a column its category requires. Fatal for the run.
    #[error("Schema mismatch for {category} in {file}: missing column '{column}'")]
    SchemaMismatch {
        category: String,
        file: String,
        column: String,
    },

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid security identifier: {0}")]
    InvalidSecurityId(String),

    #[error("Download failed for {key}: {reason}")]
    Download { key: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[cfg(feature = "rusqlite-support")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl EtlError {
    /// True for errors that must abort the run rather than degrade the dataset
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::SchemaMismatch { .. } | EtlError::ConfigError(_))
    }
}

/// Result type alias for Brain ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_message() {
        let err = EtlError::SchemaMismatch {
            category: "BSI".to_string(),
            file: "sentimentDays7_20210201.csv".to_string(),
            column: "VOLUME".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("BSI"));
        assert!(msg.contains("sentimentDays7_20210201.csv"));
        assert!(msg.contains("VOLUME"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_download_error_is_soft() {
        let err = EtlError::Download {
            key: "BSI/sentimentDays7_20210201.csv".to_string(),
            reason: "404".to_string(),
        };
        assert!(!err.is_fatal());
    }
}
