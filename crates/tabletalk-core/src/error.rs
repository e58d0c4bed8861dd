use thiserror::Error;

/// Top-level error type for the TableTalk system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates either
/// use these variants directly or define their own error types and implement
/// `From<SubsystemError> for TabletalkError` so that the `?` operator works
/// seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TabletalkError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded bytes could not be parsed as a supported data format.
    #[error("Format error: {0}")]
    Format(String),

    /// The language-model service failed or returned unusable text.
    #[error("Translation error: {0}")]
    Translation(String),

    /// A statement failed against the SQLite engine.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload too large: {size} bytes exceeds {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl From<toml::de::Error> for TabletalkError {
    fn from(err: toml::de::Error) -> Self {
        TabletalkError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TabletalkError {
    fn from(err: toml::ser::Error) -> Self {
        TabletalkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TabletalkError {
    fn from(err: serde_json::Error) -> Self {
        TabletalkError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for TableTalk operations.
pub type Result<T> = std::result::Result<T, TabletalkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabletalkError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(TabletalkError, &str)> = vec![
            (
                TabletalkError::Format("not a database".to_string()),
                "Format error: not a database",
            ),
            (
                TabletalkError::Translation("service unreachable".to_string()),
                "Translation error: service unreachable",
            ),
            (
                TabletalkError::Execution("no such table: users".to_string()),
                "Execution error: no such table: users",
            ),
            (
                TabletalkError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                TabletalkError::Api("bad request".to_string()),
                "API error: bad request",
            ),
            (
                TabletalkError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TabletalkError = io_err.into();
        assert!(matches!(err, TabletalkError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let parsed: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        let err: TabletalkError = parsed.unwrap_err().into();
        assert!(matches!(err, TabletalkError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        let err: TabletalkError = parsed.unwrap_err().into();
        assert!(matches!(err, TabletalkError::Serialization(_)));
    }

    #[test]
    fn test_payload_too_large_display() {
        let err = TabletalkError::PayloadTooLarge {
            size: 100,
            limit: 50,
        };
        assert_eq!(
            err.to_string(),
            "Payload too large: 100 bytes exceeds 50 bytes"
        );
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_debug_impl() {
        let err = TabletalkError::Execution("syntax error".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Execution"));
        assert!(debug_str.contains("syntax error"));
    }
}
