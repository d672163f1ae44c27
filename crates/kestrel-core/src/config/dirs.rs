use directories::ProjectDirs;
use std::path::PathBuf;

/// Application directories following XDG spec
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/kestrel)
    pub config: PathBuf,

    /// Data directory (~/.local/share/kestrel)
    pub data: PathBuf,

    /// User plugins directory (~/.config/kestrel/plugins)
    pub plugins: PathBuf,

    /// Config file path
    pub config_file: PathBuf,
}

impl Directories {
    /// Resolve the standard per-user paths.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> crate::Result<Self> {
        let project = ProjectDirs::from("", "", "kestrel").ok_or_else(|| {
            crate::Error::Config("failed to determine project directories".to_string())
        })?;

        let config = project.config_dir().to_path_buf();
        Ok(Self {
            plugins: config.join("plugins"),
            config_file: config.join("config.json"),
            data: project.data_dir().to_path_buf(),
            config,
        })
    }

    /// Everything rooted under one directory, used by tests and `--config-dir`.
    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            plugins: base.join("plugins"),
            config_file: base.join("config.json"),
            data: base.clone(),
            config: base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_layout() {
        let dirs = Directories::with_base(PathBuf::from("/tmp/kestrel-test"));
        assert_eq!(dirs.plugins, PathBuf::from("/tmp/kestrel-test/plugins"));
        assert_eq!(
            dirs.config_file,
            PathBuf::from("/tmp/kestrel-test/config.json")
        );
        assert_eq!(dirs.data, dirs.config);
    }
}
