// SPDX-FileCopyrightText: 2026 dmrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based loader.
//!
//! Lookup order (later overrides earlier): compiled defaults,
//! `/etc/dmrelay/dmrelay.toml`, `$XDG_CONFIG_HOME/dmrelay/dmrelay.toml`,
//! `./dmrelay.toml`, then `DMRELAY_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DmRelayConfig;

const SYSTEM_CONFIG: &str = "/etc/dmrelay/dmrelay.toml";
const LOCAL_CONFIG: &str = "dmrelay.toml";

/// Config sections that env keys are split on. Longest prefixes are not needed
/// because no section name is a prefix of another.
const SECTIONS: &[&str] = &["agent", "discord", "history", "storage"];

/// Every TOML file the default loader consults, lowest precedence first.
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("dmrelay").join(LOCAL_CONFIG));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG));
    paths
}

/// Build the full layered figment without extracting it.
pub fn build_figment() -> Figment {
    config_file_candidates()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(DmRelayConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env overrides.
pub fn load_config() -> Result<DmRelayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DmRelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DmRelayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file, still honouring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<DmRelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DmRelayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `DMRELAY_HISTORY_FETCH_LIMIT` to `history.fetch_limit`.
///
/// Only the first underscore after a known section becomes a dot, so keys
/// that themselves contain underscores stay intact.
fn env_provider() -> Env {
    Env::prefixed("DMRELAY_").map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        SECTIONS
            .iter()
            .find_map(|section| {
                key.strip_prefix(*section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|field| format!("{section}.{field}"))
            })
            .unwrap_or(key)
            .into()
    })
}
