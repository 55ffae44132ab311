use crate::core::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Named-connection registry parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Connection id used when `connect` is called without one
    #[serde(default)]
    pub default_database_id: String,
    #[serde(default)]
    pub databases: Vec<DatabaseInfo>,
}

/// Settings for one named connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseInfo {
    pub id: String,
    pub driver_name: String,
    pub connection_string: String,
    pub schema: String,
    /// Empty means the driver family default
    pub parameter_placeholder: String,
    pub parameter_in_sequence: bool,
    /// Zero, one or two characters; see `dialect::escape_chars`
    pub reserved_word_escape_char: String,
    pub max_open_connection: u32,
    pub max_idle_connection: u32,
    /// Seconds
    pub max_connection_lifetime: u64,
    pub ping: Option<bool>,
    /// File-backed stores ("file", "sqlite") are never pinged
    pub storage_type: String,
    /// Statement keyword overrides, e.g. `savepoint_start`
    pub keyword_map: HashMap<String, String>,
    pub sequence_generator: Option<SequenceGenerator>,
}

/// Templates for the named-counter sequence generator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SequenceGenerator {
    pub upsert_query: String,
    pub result_query: String,
    pub name_placeholder: String,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Looks up a connection; a blank id resolves to `default_database_id`.
    pub fn database(&self, id: Option<&str>) -> Option<&DatabaseInfo> {
        let id = match id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => self.default_database_id.trim(),
        };
        self.databases.iter().find(|d| d.id == id)
    }
}

impl DatabaseInfo {
    /// Whether a freshly opened handle should be pinged.
    pub fn should_ping(&self) -> bool {
        let file_backed = matches!(
            self.storage_type.to_ascii_lowercase().as_str(),
            "file" | "sqlite" | "sqlite3"
        );
        !file_backed && self.ping.unwrap_or(true)
    }

    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.keyword_map
            .get(key)
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = datahelper::config::load_config("datahelper.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}
