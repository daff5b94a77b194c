//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to produce a usable [`StrataSettings`](crate::StrataSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("malformed JSON in {}: {source}", .path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The merged document does not fit the settings schema
    /// (for example a string where a number is expected).
    #[error("settings do not match the schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// A value parsed but is outside what the engine accepts.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Dotted camelCase key, as written in the settings file.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Parse { .. } => "parse",
            Self::Schema(_) => "schema",
            Self::InvalidValue { .. } => "invalid_value",
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/home/ada/.strata/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "cannot read /home/ada/.strata/settings.json: denied"
        );
        assert_eq!(err.error_kind(), "read");
    }

    #[test]
    fn parse_error_keeps_source() {
        let source = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        assert!(err.to_string().starts_with("malformed JSON in settings.json"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn schema_error_from_conversion() {
        let json_err = serde_json::from_value::<u32>(serde_json::json!("deep")).unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Schema(_)));
        assert_eq!(err.error_kind(), "schema");
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue {
            key: "dispatch.maxDepth",
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for dispatch.maxDepth: must be at least 1"
        );
    }
}
