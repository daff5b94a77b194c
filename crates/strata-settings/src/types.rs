//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file may name only the fields it wants to change.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "dispatch": { "maxDepth": 64, "traceLinks": true },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StrataSettings {
    /// Settings schema version.
    pub version: String,
    /// Log output configuration.
    pub logging: LoggingSettings,
    /// Dispatch engine limits and diagnostics.
    pub dispatch: DispatchSettings,
    /// Layer activation behavior.
    pub activation: ActivationSettings,
}

impl Default for StrataSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            logging: LoggingSettings::default(),
            dispatch: DispatchSettings::default(),
            activation: ActivationSettings::default(),
        }
    }
}

impl StrataSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_depth == 0 {
            return Err(SettingsError::InvalidValue {
                key: "dispatch.maxDepth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.logging.level.trim().is_empty() {
            return Err(SettingsError::InvalidValue {
                key: "logging.level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Log output configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Dispatch engine limits and diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Maximum number of dispatches nested on one thread.
    pub max_depth: usize,
    /// Emit a trace event for every chain link executed.
    pub trace_links: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_depth: 256,
            trace_links: false,
        }
    }
}

/// Layer activation behavior.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivationSettings {
    /// Treat activating an already globally active layer (or deactivating
    /// an inactive one) as an error. When off, the call is a logged no-op.
    pub strict_global: bool,
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            strict_global: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_json_field_names() {
        let json = serde_json::to_value(StrataSettings::default()).unwrap();
        assert!(json.get("version").is_some());
        assert!(json["dispatch"].get("maxDepth").is_some());
        assert!(json["dispatch"].get("traceLinks").is_some());
        assert!(json["activation"].get("strictGlobal").is_some());
        assert_eq!(json["logging"]["level"], "warn");
    }

    #[test]
    fn empty_json_produces_defaults() {
        let settings: StrataSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, StrataSettings::default());
    }

    #[test]
    fn partial_json_overrides() {
        let json = serde_json::json!({
            "dispatch": { "traceLinks": true }
        });
        let settings: StrataSettings = serde_json::from_value(json).unwrap();
        assert!(settings.dispatch.trace_links);
        assert_eq!(settings.dispatch.max_depth, 256);
        assert!(settings.activation.strict_global);
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let mut settings = StrataSettings::default();
        settings.dispatch.max_depth = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("maxDepth"));
    }

    #[test]
    fn validate_rejects_blank_level() {
        let mut settings = StrataSettings::default();
        settings.logging.level = "  ".to_string();
        assert!(settings.validate().is_err());
        assert!(StrataSettings::default().validate().is_ok());
    }
}
