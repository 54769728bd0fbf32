//! Server configuration read from a TOML file
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::server::{Context, MimeTypes, Limits, MAX_LINE_SIZE, MAX_ENTITY_SIZE};


quick_error! {
    #[derive(Debug)]
    pub enum ConfigError {
        Io(path: PathBuf, err: io::Error) {
            display("can't read {:?}: {}", path, err)
            source(err)
        }
        Parse(err: toml::de::Error) {
            display("can't parse config: {}", err)
            from()
            source(err)
        }
        Invalid(reason: String) {
            display("invalid config: {}", reason)
        }
    }
}

/// Configuration of the whole server
///
/// Every key is optional, missing ones take the value of
/// `Config::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub port: u16,
    pub min_workers: usize,
    pub max_workers: usize,
    pub clients_per_worker: usize,
    pub max_line_size: usize,
    pub max_entity_size: u64,
    pub temp_dir: PathBuf,
    pub document_root: PathBuf,
    /// Extension to content type, added over the built-in table
    pub mime_types: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 8080,
            min_workers: 2,
            max_workers: 8,
            clients_per_worker: 64,
            max_line_size: MAX_LINE_SIZE,
            max_entity_size: MAX_ENTITY_SIZE,
            temp_dir: env::temp_dir(),
            document_root: PathBuf::from("."),
            mime_types: HashMap::new(),
        }
    }
}

impl Config {
    /// Reads and validates the config file
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Config::parse(&data)
    }
    pub fn parse(data: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_workers == 0 {
            return Err(ConfigError::Invalid(
                "min_workers must be at least 1".into()));
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::Invalid(format!(
                "min_workers ({}) is greater than max_workers ({})",
                self.min_workers, self.max_workers)));
        }
        if self.clients_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "clients_per_worker must be at least 1".into()));
        }
        if self.max_line_size == 0 {
            return Err(ConfigError::Invalid(
                "max_line_size must be at least 1".into()));
        }
        Ok(())
    }
    pub fn limits(&self) -> Limits {
        Limits {
            max_line_size: self.max_line_size,
            max_entity_size: self.max_entity_size,
            temp_dir: self.temp_dir.clone(),
        }
    }
    /// Builds the handler context: document root and MIME table
    pub fn context(&self) -> Context {
        let mut mime = MimeTypes::new();
        for (ext, mime_type) in &self.mime_types {
            mime.insert(ext, mime_type);
        }
        Context::new(self.document_root.clone(), mime)
    }
}
