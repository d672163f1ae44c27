use super::ProcessPlugin;
use crate::{Error, Result};
use kestrel_types::PluginMetadata;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MANIFEST_FILENAME: &str = "plugin.json";

/// On-disk description of a stdio plugin (`plugin.json`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(flatten)]
    pub metadata: PluginMetadata,

    /// Executable, relative to the plugin directory
    pub entry: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl Manifest {
    /// Read and validate `plugin.json` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or unparsable, or has an
    /// empty id, name or trigger keyword list, or its entry does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILENAME);
        if !manifest_path.exists() {
            return Err(Error::Plugin(format!(
                "{} not found in {}",
                MANIFEST_FILENAME,
                dir.display()
            )));
        }

        let content = std::fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            Error::Plugin(format!(
                "Failed to parse manifest at {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        manifest.validate(dir)?;
        Ok(manifest)
    }

    fn validate(&self, dir: &Path) -> Result<()> {
        let invalid = |what: &str| {
            Err(Error::Plugin(format!(
                "Invalid manifest in {}: {what}",
                dir.display()
            )))
        };

        if self.metadata.id.trim().is_empty() {
            return invalid("id is empty");
        }
        if self.metadata.name.trim().is_empty() {
            return invalid("name is empty");
        }
        if self.metadata.trigger_keywords.is_empty() {
            return invalid("triggerKeywords is empty");
        }
        if self.metadata.trigger_keywords.iter().any(|k| k.trim().is_empty()) {
            return invalid("triggerKeywords contains an empty keyword");
        }
        if self.entry.trim().is_empty() {
            return invalid("entry is empty");
        }
        if !self.entry_path(dir).is_file() {
            return invalid(&format!("entry {} not found", self.entry));
        }
        Ok(())
    }

    #[must_use]
    pub fn entry_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.entry)
    }
}

/// Load every valid plugin below `dir`, one per subdirectory, sorted by
/// directory name.
///
/// Invalid manifests are logged and skipped. A missing `dir` yields no
/// plugins.
///
/// # Errors
///
/// Returns an error if `dir` exists but cannot be listed.
pub fn discover(dir: &Path) -> Result<Vec<ProcessPlugin>> {
    if !dir.exists() {
        debug!("Plugin directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();

    let mut plugins: Vec<ProcessPlugin> = Vec::new();
    for plugin_dir in subdirs {
        if !plugin_dir.join(MANIFEST_FILENAME).exists() {
            continue;
        }
        match Manifest::load(&plugin_dir) {
            Ok(manifest) => {
                let id = manifest.metadata.id.clone();
                if plugins.iter().any(|p| p.metadata().id == id) {
                    warn!(
                        "Skipping {}: duplicate plugin id '{}'",
                        plugin_dir.display(),
                        id
                    );
                    continue;
                }
                debug!("Loaded plugin: {} from {}", id, plugin_dir.display());
                plugins.push(ProcessPlugin::from_manifest(manifest, &plugin_dir));
            }
            Err(e) => warn!("Failed to load plugin from {}: {}", plugin_dir.display(), e),
        }
    }

    info!(
        "Discovered {} plugin(s) in {}",
        plugins.len(),
        dir.display()
    );
    Ok(plugins)
}
