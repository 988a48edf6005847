//! cloudweave configuration
//!
//! Locates the profile file and turns its KDL into provider profiles.

pub mod error;
pub mod profile;

pub use error::*;
pub use profile::{apply_profiles, load_profiles, parse_profiles};

use std::path::PathBuf;

/// Environment variable naming a profile file directly
pub const CONFIG_PATH_ENV: &str = "CLOUDWEAVE_CONFIG_PATH";

const CANDIDATES: [&str; 4] = ["weave.local.kdl", ".weave.local.kdl", "weave.kdl", ".weave.kdl"];

/// cloudweave's directory under the user config dir, created on demand
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("cloudweave");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the profile file.
///
/// Search order:
/// 1. `CLOUDWEAVE_CONFIG_PATH`
/// 2. current directory: weave.local.kdl, .weave.local.kdl, weave.kdl, .weave.kdl
/// 3. the same names under ./.cloudweave/
/// 4. ~/.config/cloudweave/weave.kdl
pub fn find_profiles_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let weave_dir = current_dir.join(".cloudweave");
    if weave_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = weave_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("cloudweave").join("weave.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ProfileFileNotFound)
}
