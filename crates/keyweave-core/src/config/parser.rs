// Keyweave Config Parser - TOML with Serde
// Turns a TOML file into rule tables and runtime settings

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::command::{self, Command, Hint, KeystrokeError};
use crate::context::{Condition, ConditionError};
use crate::input::{ControlKeys, DeviceFilter};
use crate::mapping::{Keymap, Modmap, MultiModmap, RuleError, RuleTables, Timeouts};
use crate::output::ThrottleDelays;
use crate::{Combo, Key, Modifier, ModifierError};

use super::ComboParseError;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid combo '{combo}': {source}")]
    InvalidCombo {
        combo: String,
        source: ComboParseError,
    },

    #[error("Invalid condition in '{name}': {source}")]
    InvalidCondition {
        name: String,
        source: ConditionError,
    },

    #[error("Invalid output for '{combo}' in keymap '{keymap}': {reason}")]
    InvalidOutput {
        keymap: String,
        combo: String,
        reason: String,
    },

    #[error(transparent)]
    Keystrokes(#[from] KeystrokeError),

    #[error(transparent)]
    Modifier(#[from] ModifierError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error("Timeout value out of range: {0}")]
    TimeoutOutOfRange(String),
}

/// Root TOML table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    #[serde(default)]
    pub general: Option<GeneralConfig>,

    #[serde(default)]
    pub timeouts: Option<TimeoutConfig>,

    #[serde(default)]
    pub delays: Option<DelayConfig>,

    #[serde(default)]
    pub devices: Option<DevicesConfig>,

    /// User-defined modifiers, registered before anything else is parsed
    #[serde(default)]
    pub modifier: Vec<ModifierToml>,

    #[serde(default)]
    pub modmap: Vec<ModmapToml>,

    #[serde(default)]
    pub multipurpose: Vec<MultipurposeToml>,

    #[serde(default)]
    pub keymap: Vec<KeymapToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Key that dumps diagnostics to the log
    pub diagnostics_key: Option<String>,
    /// Key that releases everything and exits
    pub emergency_eject_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Tap/hold decision window (milliseconds)
    pub multipurpose: Option<u64>,
    /// Modifier suspend window (milliseconds)
    pub suspend: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    pub key_pre_delay_ms: Option<u64>,
    pub key_post_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevicesConfig {
    /// Explicit device names/paths to grab
    #[serde(default)]
    pub only: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModifierToml {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModmapToml {
    pub name: String,
    pub condition: Option<String>,
    pub mappings: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultipurposeToml {
    pub name: String,
    pub condition: Option<String>,
    /// trigger = [tap, hold]
    pub mappings: HashMap<String, (String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeymapToml {
    pub name: Option<String>,
    pub condition: Option<String>,
    #[serde(default)]
    pub mappings: IndexMap<String, OutputToml>,
}

/// Right-hand side of a keymap entry
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OutputToml {
    /// A combo, a key, `U+XXXX` or a bare hint (`bind`, `ignore`,
    /// `escape_next_key`)
    Single(String),
    /// Commands run in order
    Sequence(Vec<OutputToml>),
    Table(CommandToml),
}

/// Command written as a one-entry table, e.g. `{ text = "hi" }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandToml {
    pub text: Option<String>,
    pub unicode: Option<u32>,
    pub sleep_ms: Option<u64>,
    pub with_mark: Option<String>,
    pub set_mark: Option<bool>,
    pub with_or_set_mark: Option<String>,
    pub nested: Option<IndexMap<String, OutputToml>>,
}

/// Everything the runtime needs from a configuration file
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub rules: RuleTables,
    pub control_keys: ControlKeys,
    pub devices: DeviceFilter,
    pub delays: ThrottleDelays,
    /// Modifiers this file registered
    pub modifiers: Vec<Modifier>,
}

impl Config {
    pub fn from_toml_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::info!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let toml_config: ConfigToml = toml::from_str(content)?;
        toml_config.to_config()
    }
}

impl ConfigToml {
    fn to_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        for def in &self.modifier {
            let keys = def.keys.iter().map(|k| parse_key(k)).collect::<Result<Vec<_>, _>>()?;
            config
                .modifiers
                .push(Modifier::add(&def.name, def.aliases.clone(), keys)?);
        }

        if let Some(general) = &self.general {
            if let Some(key) = &general.diagnostics_key {
                config.control_keys.diagnostics = parse_key(key)?;
            }
            if let Some(key) = &general.emergency_eject_key {
                config.control_keys.eject = parse_key(key)?;
            }
        }

        let timeouts = self.timeouts()?;

        if let Some(delays) = &self.delays {
            config.delays = ThrottleDelays::from_millis(
                delays.key_pre_delay_ms.unwrap_or(0),
                delays.key_post_delay_ms.unwrap_or(0),
            );
        }

        if let Some(devices) = &self.devices {
            config.devices = DeviceFilter::new(devices.only.iter().cloned());
        }

        let modmaps = self
            .modmap
            .iter()
            .map(|entry| {
                let mut mappings = HashMap::with_capacity(entry.mappings.len());
                for (from, to) in &entry.mappings {
                    mappings.insert(parse_key(from)?, parse_key(to)?);
                }
                Ok(match parse_condition(&entry.name, entry.condition.as_deref())? {
                    Some(cond) => Modmap::with_condition(entry.name.as_str(), mappings, cond),
                    None => Modmap::new(entry.name.as_str(), mappings),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let multi_modmaps = self
            .multipurpose
            .iter()
            .map(|entry| {
                let mut mappings = HashMap::with_capacity(entry.mappings.len());
                for (trigger, (tap, hold)) in &entry.mappings {
                    mappings.insert(parse_key(trigger)?, (parse_key(tap)?, parse_key(hold)?));
                }
                Ok(match parse_condition(&entry.name, entry.condition.as_deref())? {
                    Some(cond) => MultiModmap::with_condition(entry.name.as_str(), mappings, cond),
                    None => MultiModmap::new(entry.name.as_str(), mappings),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let keymaps = self
            .keymap
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let name = entry.name.clone().unwrap_or_else(|| format!("keymap_{}", i + 1));
                let keymap = match parse_condition(&name, entry.condition.as_deref())? {
                    Some(cond) => Keymap::with_condition(name.as_str(), cond),
                    None => Keymap::new(name.as_str()),
                };
                build_keymap(keymap, &entry.mappings)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        config.rules = RuleTables::new(modmaps, multi_modmaps, keymaps, timeouts)?;
        log::debug!("Config loaded: {}", config.rules.summary());
        Ok(config)
    }

    fn timeouts(&self) -> Result<Timeouts, ConfigError> {
        let mut timeouts = Timeouts::default();
        let Some(config) = &self.timeouts else {
            return Ok(timeouts);
        };
        if let Some(mp) = config.multipurpose {
            if !(100..=5000).contains(&mp) {
                return Err(ConfigError::TimeoutOutOfRange(format!(
                    "multipurpose must be 100-5000ms, got {}",
                    mp
                )));
            }
            timeouts.multipurpose = Duration::from_millis(mp);
        }
        if let Some(st) = config.suspend {
            if !(100..=10000).contains(&st) {
                return Err(ConfigError::TimeoutOutOfRange(format!(
                    "suspend must be 100-10000ms, got {}",
                    st
                )));
            }
            timeouts.suspend = Duration::from_millis(st);
        }
        Ok(timeouts)
    }
}

fn build_keymap(mut keymap: Keymap, mappings: &IndexMap<String, OutputToml>) -> Result<Keymap, ConfigError> {
    for (combo_str, output) in mappings {
        let combo = parse_combo(combo_str)?;
        let commands = parse_output(keymap.name(), combo_str, output)?;
        log::trace!("keymap='{}' combo='{}' commands={:?}", keymap.name(), combo, commands);
        keymap.insert(combo, commands);
    }
    Ok(keymap)
}

fn parse_output(keymap: &str, combo: &str, output: &OutputToml) -> Result<Vec<Command>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidOutput {
        keymap: keymap.to_string(),
        combo: combo.to_string(),
        reason,
    };

    match output {
        OutputToml::Single(s) => Ok(vec![parse_single(s).map_err(invalid)?]),
        OutputToml::Sequence(items) => {
            let mut commands = Vec::with_capacity(items.len());
            for item in items {
                commands.extend(parse_output(keymap, combo, item)?);
            }
            Ok(commands)
        }
        OutputToml::Table(table) => {
            let mut found = Vec::new();
            if let Some(text) = &table.text {
                found.push(command::to_keystrokes(text)?);
            }
            if let Some(cp) = table.unicode {
                found.push(command::unicode_keystrokes(cp)?);
            }
            if let Some(ms) = table.sleep_ms {
                found.push(command::sleep_ms(ms));
            }
            if let Some(c) = &table.with_mark {
                found.push(command::with_mark(parse_combo(c)?));
            }
            if let Some(mark) = table.set_mark {
                found.push(command::set_mark(mark));
            }
            if let Some(c) = &table.with_or_set_mark {
                found.push(command::with_or_set_mark(parse_combo(c)?));
            }
            if let Some(nested) = &table.nested {
                let inner = build_keymap(Keymap::new(format!("{} > {}", keymap, combo)), nested)?;
                found.push(Command::from(inner));
            }
            if found.len() != 1 {
                return Err(invalid(format!(
                    "expected exactly one command in table, got {}",
                    found.len()
                )));
            }
            Ok(found)
        }
    }
}

fn parse_single(s: &str) -> Result<Command, String> {
    let trimmed = s.trim();
    if let Ok(hint) = trimmed.parse::<Hint>() {
        return Ok(hint.into());
    }
    if let Some(cp) = parse_unicode_output(trimmed) {
        return command::unicode_keystrokes(cp).map_err(|e| e.to_string());
    }
    let combo: Combo = trimmed.parse().map_err(|e: ComboParseError| e.to_string())?;
    // Either way held modifiers the output does not ask for are lifted
    if combo.modifiers().is_empty() {
        Ok(Command::Key(combo.key()))
    } else {
        Ok(Command::Combo(combo))
    }
}

/// `U+00E9`
fn parse_unicode_output(s: &str) -> Option<u32> {
    let hex = s.strip_prefix("U+").or_else(|| s.strip_prefix("u+"))?;
    u32::from_str_radix(hex, 16).ok()
}

fn parse_key(name: &str) -> Result<Key, ConfigError> {
    let trimmed = name.trim();
    Key::from_name(trimmed).ok_or_else(|| ConfigError::InvalidKey(trimmed.to_string()))
}

fn parse_combo(s: &str) -> Result<Combo, ConfigError> {
    s.parse().map_err(|source| ConfigError::InvalidCombo {
        combo: s.to_string(),
        source,
    })
}

fn parse_condition(name: &str, condition: Option<&str>) -> Result<Option<Condition>, ConfigError> {
    condition
        .map(|c| {
            Condition::parse(c).map_err(|source| ConfigError::InvalidCondition {
                name: name.to_string(),
                source,
            })
        })
        .transpose()
}
