// Keyweave Config
// Combo strings and the TOML configuration file

pub mod combo_parser;
pub mod parser;

use std::path::PathBuf;

pub use combo_parser::{parse_combo_string, ComboParseError, ParsedCombo};
pub use parser::{Config, ConfigError, ConfigToml, OutputToml};

/// `$XDG_CONFIG_HOME/keyweave/config.toml`, when a config dir is known
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keyweave").join("config.toml"))
}
