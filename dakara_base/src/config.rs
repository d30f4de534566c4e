//! # Configuration Module
//!
//! Loads a YAML configuration file and overlays it with environment
//! variables, so any key of the file can be overridden without editing it:
//! the key `server.address` of a config loaded with the prefix `DAKARA` is
//! overridden by the `DAKARA_SERVER_ADDRESS` environment variable.
//!
//! The module also installs the logger used by all the applications. Call
//! [`create_logger`] before loading the config, as [`load_config`] already
//! logs, then adjust the verbosity from the config with [`set_loglevel`]:
//!
//! ```no_run
//! use std::path::Path;
//! use dakara_base::config::{create_logger, load_config, set_loglevel};
//!
//! create_logger().unwrap();
//! let config = load_config(Path::new("config.yaml"), "DAKARA", false, &["server"]).unwrap();
//! set_loglevel(&config);
//! ```

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_yml::{Mapping, Value};
use thiserror::Error;

use crate::directory::AppDirs;

/// Log level applied until [`set_loglevel`] is called.
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Errors raised when loading or creating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("No config file found")]
    NotFound,

    /// The config file exists but could not be accessed.
    #[error("Unable to access config file: {0}")]
    Io(#[source] io::Error),

    /// The config file content is not valid YAML.
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),

    /// The config file misses a mandatory key.
    #[error("Invalid config file, missing '{0}'")]
    Invalid(String),

    /// The config file root is not a key-value mapping.
    #[error("Invalid config file, expected a mapping at root")]
    NotAMapping,

    /// The user config directory cannot be determined on this system.
    #[error("Unable to determine the user config directory")]
    Directory,

    /// The logger was installed twice.
    #[error("Unable to install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// Loaded configuration with environment variable overlay.
///
/// Values are accessed by dotted path. The environment always wins over the
/// file: for a config with prefix `DAKARA`, the path `server.address` is
/// looked up in `DAKARA_SERVER_ADDRESS` first. Environment values are parsed
/// as YAML scalars, so `true` or `42` cast to their natural types.
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
    prefix: String,
}

impl Config {
    /// Wrap an already parsed YAML mapping.
    pub fn new(root: Value, prefix: &str) -> Self {
        Self {
            root,
            prefix: prefix.to_uppercase(),
        }
    }

    /// Tell if the given key is present at the root of the config file.
    pub fn has(&self, key: &str) -> bool {
        self.root.get(key).is_some()
    }

    /// Get a value by dotted path.
    ///
    /// Returns `None` when the path is absent from both the environment and
    /// the file, or when the value cannot deserialize into `T`.
    pub fn get<T>(&self, path: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        if let Ok(raw) = env::var(self.env_name(path)) {
            if let Ok(value) = serde_yml::from_str(&raw) {
                return Some(value);
            }
        }

        let value = self.lookup(path)?;
        serde_yml::from_value(value.clone()).ok()
    }

    /// Get a mandatory value by dotted path.
    ///
    /// Whole sections deserialize into structs, with the environment overlay
    /// applied to each of their leaf keys beforehand.
    pub fn require<T>(&self, path: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.lookup(path) {
            Some(found) => {
                let mut value = found.clone();
                overlay_env(&mut value, &self.env_name(path));
                Ok(serde_yml::from_value(value)?)
            }
            None => match env::var(self.env_name(path)) {
                Ok(raw) => Ok(serde_yml::from_str(&raw)?),
                Err(_) => Err(ConfigError::Invalid(path.to_string())),
            },
        }
    }

    /// Set a root-level key, overriding the file value.
    pub fn set(&mut self, key: &str, value: Value) {
        if let Some(mapping) = self.root.as_mapping_mut() {
            mapping.insert(Value::String(key.to_string()), value);
        }
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    fn env_name(&self, path: &str) -> String {
        format!("{}_{}", self.prefix, normalize_key(path))
    }
}

fn normalize_key(key: &str) -> String {
    key.replace(['.', '-'], "_").to_uppercase()
}

/// Replace scalar leaves by their environment override, if any.
fn overlay_env(value: &mut Value, env_name: &str) {
    match value.as_mapping_mut() {
        Some(mapping) => {
            for (key, child) in mapping.iter_mut() {
                if let Some(key) = key.as_str() {
                    overlay_env(child, &format!("{}_{}", env_name, normalize_key(key)));
                }
            }
        }
        None => {
            if let Ok(raw) = env::var(env_name) {
                if let Ok(parsed) = serde_yml::from_str(&raw) {
                    *value = parsed;
                }
            }
        }
    }
}

/// Load the config from the given YAML file.
///
/// With `debug` enabled, the `loglevel` key of the config is forced to
/// `debug`. The keys listed in `mandatory_keys` must be present at the root
/// of the file.
pub fn load_config(
    path: &Path,
    prefix: &str,
    debug: bool,
    mandatory_keys: &[&str],
) -> Result<Config, ConfigError> {
    log::info!("Loading config file '{}'", path.display());

    let content = fs::read_to_string(path).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound,
        _ => ConfigError::Io(error),
    })?;

    let root: Value = serde_yml::from_str(&content)?;
    let root = match root {
        Value::Mapping(_) => root,
        // an empty file parses as null, treat it as an empty config
        Value::Null => Value::Mapping(Mapping::new()),
        _ => return Err(ConfigError::NotAMapping),
    };

    for key in mandatory_keys {
        if root.get(key).is_none() {
            return Err(ConfigError::Invalid((*key).to_string()));
        }
    }

    let mut config = Config::new(root, prefix);

    if debug {
        config.set("loglevel", Value::String("debug".to_string()));
    }

    Ok(config)
}

/// Install the logger.
///
/// The dispatch itself accepts every level, runtime verbosity is driven by
/// the global max level so [`set_loglevel`] can adjust it afterwards.
pub fn create_logger() -> Result<(), ConfigError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let level = match record.level() {
                log::Level::Error => "ERROR".bright_red(),
                log::Level::Warn => "WARN".bright_yellow(),
                log::Level::Info => "INFO".bright_green(),
                log::Level::Debug => "DEBUG".bright_white(),
                log::Level::Trace => "TRACE".bright_cyan(),
            };
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                level,
                message
            ))
        })
        .level(LevelFilter::Trace)
        .chain(io::stderr())
        .apply()?;

    log::set_max_level(DEFAULT_LOG_LEVEL);
    Ok(())
}

/// Set the logger verbosity from the `loglevel` key of the config.
pub fn set_loglevel(config: &Config) {
    let level = config
        .get::<String>("loglevel")
        .unwrap_or_else(|| "info".to_string());
    log::set_max_level(parse_loglevel(&level));
}

fn parse_loglevel(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Get the config directory of the application.
pub fn get_config_directory() -> Option<PathBuf> {
    AppDirs::default().user_config_dir()
}

/// Get the path of the given config file within the config directory.
pub fn get_config_file(filename: &str) -> Option<PathBuf> {
    get_config_directory().map(|directory| directory.join(filename))
}

/// Create the config file from a template.
///
/// The file is copied into the user config directory. If it already exists,
/// the user is asked for confirmation on the standard input, unless `force`
/// is set.
pub fn create_config_file(template: &Path, filename: &str, force: bool) -> Result<PathBuf, ConfigError> {
    let directory = get_config_directory().ok_or(ConfigError::Directory)?;
    create_config_file_in(&directory, template, filename, force)
}

/// Create the config file from a template in the given directory.
///
/// Same as [`create_config_file`], with an explicit destination directory
/// instead of the user config directory. The directory is created if needed.
pub fn create_config_file_in(
    directory: &Path,
    template: &Path,
    filename: &str,
    force: bool,
) -> Result<PathBuf, ConfigError> {
    let destination = directory.join(filename);

    fs::create_dir_all(directory).map_err(ConfigError::Io)?;

    if !force && destination.exists() {
        print!("{} already exists, overwrite? [y/N] ", destination.display());
        io::stdout().flush().map_err(ConfigError::Io)?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer).map_err(ConfigError::Io)?;

        if !answer.trim().to_lowercase().starts_with('y') {
            return Ok(destination);
        }
    }

    fs::copy(template, &destination).map_err(ConfigError::Io)?;
    log::info!("Config created in '{}'", destination.display());

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs::File;
    use tempfile::tempdir;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    const CONTENT: &str = "key:\n  subkey: value\nloglevel: info\n";

    #[test]
    fn test_load_config_success() {
        let (_dir, path) = write_config(CONTENT);
        let config = load_config(&path, "DKTESTA", false, &[]).unwrap();

        assert_eq!(config.get::<String>("key.subkey").unwrap(), "value");
        assert!(config.has("key"));
        assert!(!config.has("absent"));
    }

    #[test]
    fn test_load_config_debug_overrides_loglevel() {
        let (_dir, path) = write_config(CONTENT);
        let config = load_config(&path, "DKTESTA", true, &[]).unwrap();

        assert_eq!(config.get::<String>("loglevel").unwrap(), "debug");
    }

    #[test]
    fn test_load_config_not_found() {
        let error = load_config(Path::new("nowhere.yaml"), "DKTESTA", false, &[]).unwrap_err();
        assert!(matches!(error, ConfigError::NotFound));
        assert_eq!(error.to_string(), "No config file found");
    }

    #[test]
    fn test_load_config_parse_error() {
        let (_dir, path) = write_config("key: [unclosed\n");
        let error = load_config(&path, "DKTESTA", false, &[]).unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_missing_mandatory_key() {
        let (_dir, path) = write_config(CONTENT);
        let error = load_config(&path, "DKTESTA", false, &["not-present"]).unwrap_err();

        assert_eq!(
            error.to_string(),
            "Invalid config file, missing 'not-present'"
        );
    }

    #[test]
    fn test_load_config_root_not_a_mapping() {
        let (_dir, path) = write_config("- first\n- second\n");
        let error = load_config(&path, "DKTESTA", false, &[]).unwrap_err();

        assert!(matches!(error, ConfigError::NotAMapping));
        assert_eq!(
            error.to_string(),
            "Invalid config file, expected a mapping at root"
        );
    }

    #[test]
    fn test_load_config_empty_file() {
        let (_dir, path) = write_config("");
        let config = load_config(&path, "DKTESTA", false, &[]).unwrap();
        assert!(config.get::<String>("anything").is_none());
    }

    #[test]
    fn test_get_env_override() {
        let (_dir, path) = write_config(CONTENT);
        let config = load_config(&path, "DKTESTB", false, &[]).unwrap();

        assert_eq!(config.get::<String>("key.subkey").unwrap(), "value");

        env::set_var("DKTESTB_KEY_SUBKEY", "myvalue");
        assert_eq!(config.get::<String>("key.subkey").unwrap(), "myvalue");
        env::remove_var("DKTESTB_KEY_SUBKEY");
    }

    #[test]
    fn test_get_env_only_value_with_cast() {
        let (_dir, path) = write_config(CONTENT);
        let config = load_config(&path, "DKTESTC", false, &[]).unwrap();

        env::set_var("DKTESTC_COUNT", "42");
        env::set_var("DKTESTC_VERBOSE", "true");
        assert_eq!(config.get::<u64>("count").unwrap(), 42);
        assert!(config.get::<bool>("verbose").unwrap());
        env::remove_var("DKTESTC_COUNT");
        env::remove_var("DKTESTC_VERBOSE");
    }

    #[derive(Debug, Deserialize)]
    struct Server {
        address: String,
        ssl: bool,
    }

    #[test]
    fn test_require_section_with_env_overlay() {
        let (_dir, path) =
            write_config("server:\n  address: www.example.com\n  ssl: false\n");
        let config = load_config(&path, "DKTESTD", false, &[]).unwrap();

        env::set_var("DKTESTD_SERVER_SSL", "true");
        let server: Server = config.require("server").unwrap();
        env::remove_var("DKTESTD_SERVER_SSL");

        assert_eq!(server.address, "www.example.com");
        assert!(server.ssl);
    }

    #[test]
    fn test_require_missing_section() {
        let (_dir, path) = write_config(CONTENT);
        let config = load_config(&path, "DKTESTE", false, &[]).unwrap();

        let error = config.require::<Server>("server").unwrap_err();
        assert_eq!(error.to_string(), "Invalid config file, missing 'server'");
    }

    #[test]
    fn test_parse_loglevel() {
        assert_eq!(parse_loglevel("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_loglevel("warn"), LevelFilter::Warn);
        assert_eq!(parse_loglevel("unknown"), LevelFilter::Info);
    }

    #[test]
    fn test_get_config_file_under_config_directory() {
        if let Some(path) = get_config_file("config.yaml") {
            assert!(path.ends_with("dakara/config.yaml"));
        }
    }

    #[test]
    fn test_create_config_file_copies_template() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("config.yaml.example");
        fs::write(&template, CONTENT).unwrap();

        // the destination directory does not exist yet
        let destination_dir = dir.path().join("config").join("dakara");
        let destination =
            create_config_file_in(&destination_dir, &template, "config.yaml", false).unwrap();

        assert_eq!(destination, destination_dir.join("config.yaml"));
        assert_eq!(fs::read_to_string(&destination).unwrap(), CONTENT);
    }

    #[test]
    fn test_create_config_file_force_overwrites() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("config.yaml.example");
        fs::write(&template, CONTENT).unwrap();

        let destination_dir = dir.path().join("dakara");
        fs::create_dir_all(&destination_dir).unwrap();
        fs::write(destination_dir.join("config.yaml"), "stale: true\n").unwrap();

        let destination =
            create_config_file_in(&destination_dir, &template, "config.yaml", true).unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), CONTENT);
    }

    #[test]
    fn test_create_config_file_missing_template() {
        let dir = tempdir().unwrap();
        let template = dir.path().join("nowhere.yaml");

        let error =
            create_config_file_in(dir.path(), &template, "config.yaml", true).unwrap_err();
        assert!(matches!(error, ConfigError::Io(_)));
    }
}
