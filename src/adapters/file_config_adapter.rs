//! INI configuration adapter.

use configparser::ini::Ini;
use std::path::Path;

use crate::domain::error::BolsaError;
use crate::ports::config_port::ConfigPort;

/// `configparser` lowercases section and key names, so lookups are
/// case-insensitive.
pub struct FileConfigAdapter {
    ini: Ini,
}

fn parse_error(file: &str, reason: String) -> BolsaError {
    BolsaError::ConfigParse {
        file: file.to_string(),
        reason,
    }
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BolsaError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|reason| parse_error(&path.display().to_string(), reason))?;
        tracing::debug!(file = %path.display(), "loaded config");
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, BolsaError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| parse_error("<inline>", reason))?;
        Ok(Self { ini })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn parsed<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.ini.get(section, key)?.trim().parse().ok()
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get(section, key)
            .and_then(|v| Self::parse_bool(&v))
            .unwrap_or(default)
    }
}
