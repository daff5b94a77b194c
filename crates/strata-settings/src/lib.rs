//! # strata-settings
//!
//! Tunables for the strata dispatch engine: the log filter, the nesting
//! limit and link tracing for dispatch, and how strictly global activation
//! treats misuse.
//!
//! [`load_settings`] starts from [`StrataSettings::default()`], deep-merges
//! `~/.strata/settings.json` over it, applies `STRATA_*` environment
//! variables last and validates the result. [`get_settings`] does this once
//! per process; tests and embedders can pin a value first with
//! [`init_settings`].
//!
//! ```no_run
//! let depth = strata_settings::get_settings().dispatch.max_depth;
//! assert!(depth > 0);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<StrataSettings> = OnceLock::new();

/// Process-wide settings, loaded on first use.
///
/// A settings file that cannot be used is reported with `warn!` and the
/// compiled defaults take its place, so a bad file never stops dispatch.
pub fn get_settings() -> &'static StrataSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|err| {
            tracing::warn!(
                path = %settings_path().display(),
                kind = err.error_kind(),
                error = %err,
                "ignoring settings file, using defaults"
            );
            StrataSettings::default()
        })
    })
}

/// Pin the process-wide settings before anything reads them.
///
/// Hands `settings` back if [`get_settings`] already ran or another value
/// was pinned.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: StrataSettings) -> std::result::Result<(), StrataSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_lives_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".strata/settings.json"));
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = StrataSettings::default();
        assert_eq!(settings.version, "0.1.0");
        assert_eq!(settings.logging.level, "warn");
        assert_eq!(settings.dispatch.max_depth, 256);
        assert!(!settings.dispatch.trace_links);
        assert!(settings.activation.strict_global);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn pinned_settings_win_over_loading() {
        let mut pinned = StrataSettings::default();
        pinned.dispatch.max_depth = 12;
        // The global is shared by every test in this binary; only this test
        // touches it.
        assert!(init_settings(pinned.clone()).is_ok());
        assert_eq!(get_settings(), &pinned);
        assert!(init_settings(StrataSettings::default()).is_err());
    }
}
