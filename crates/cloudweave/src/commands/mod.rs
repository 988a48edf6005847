pub mod diff;
pub mod providers;
pub mod reconcile;

use anyhow::Context;
use cloudweave_cloud::ProviderRegistry;
use cloudweave_config::ConfigError;
use std::path::Path;

/// Built-in profiles, refined by the profile file if one is found.
pub fn load_registry(config: Option<&Path>) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::with_builtin_profiles()?;

    let path = match config {
        Some(path) => Some(path.to_path_buf()),
        None => match cloudweave_config::find_profiles_file() {
            Ok(path) => Some(path),
            Err(ConfigError::ProfileFileNotFound) => None,
            Err(e) => return Err(e.into()),
        },
    };

    if let Some(path) = path {
        let count = cloudweave_config::apply_profiles(&path, &mut registry)
            .with_context(|| format!("failed to load profiles from {}", path.display()))?;
        tracing::debug!("Loaded {} profiles from {}", count, path.display());
    }

    Ok(registry)
}

/// Resource id derived from a snapshot file name
pub fn resource_id(remote: &Path) -> String {
    remote
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("snapshot")
        .to_string()
}
