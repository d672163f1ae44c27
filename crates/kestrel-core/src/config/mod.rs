mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{Config, PluginSettings, QueryShortcut};
pub use validation::warn_unknown_fields;
