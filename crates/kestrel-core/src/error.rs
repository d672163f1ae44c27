use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Plugin fault in {plugin_id}: {reason}")]
    PluginFault { plugin_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Process error: {0}")]
    Process(String),
}

impl Error {
    pub(crate) fn fault(plugin_id: &str, reason: impl Into<String>) -> Self {
        Error::PluginFault {
            plugin_id: plugin_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_argument() {
        let err = Error::InvalidArgument("query contains NUL".to_string());
        assert_eq!(err.to_string(), "Invalid argument: query contains NUL");
    }

    #[test]
    fn test_error_display_plugin_fault() {
        let err = Error::fault("calculator", "timed out");
        assert_eq!(err.to_string(), "Plugin fault in calculator: timed out");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("\"not a number\"").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_error_display_plugin_not_found() {
        let err = Error::PluginNotFound("websearch".to_string());
        assert_eq!(err.to_string(), "Plugin not found: websearch");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Config error: missing field");
    }
}
