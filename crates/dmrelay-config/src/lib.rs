// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for dmrelay.
//!
//! TOML files found along the XDG hierarchy are merged over compiled
//! defaults, `DMRELAY_*` environment variables override both, and every
//! section rejects unknown keys. Errors are reported as miette diagnostics
//! with typo suggestions.
//!
//! ```no_run
//! use dmrelay_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("history concurrency: {}", config.history.concurrency);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::DmRelayConfig;

/// Load configuration from the standard locations and validate it.
///
/// Deserialization failures are converted to diagnostics carrying source
/// spans from whichever TOML file produced them.
pub fn load_and_validate() -> Result<DmRelayConfig, Vec<ConfigError>> {
    checked(loader::load_config(), collect_toml_sources)
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<DmRelayConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<DmRelayConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Validate a loaded config, or turn the figment error into diagnostics.
///
/// `sources` is only read on failure.
fn checked(
    loaded: Result<DmRelayConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<DmRelayConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|e| diagnostic::figment_to_config_errors(e, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn collect_toml_sources() -> Vec<(String, String)> {
    loader::config_file_candidates()
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let shown = std::fs::canonicalize(&path).unwrap_or(path);
            Some((shown.display().to_string(), content))
        })
        .collect()
}
