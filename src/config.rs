// Parser and validation configuration
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Files above this size are rejected before reading.
    pub max_file_size: u64,
    pub enable_parallel_processing: bool,
    pub max_worker_threads: usize,
    pub strict_validation: bool,
    pub allow_calculation_errors: bool,
    pub structural_validation: bool,
    /// Relative tolerance shared by every numeric comparison.
    pub calculation_tolerance: f64,
    /// Absolute tolerance used when either side of a comparison is zero.
    pub zero_tolerance: f64,
    pub critical_error_ceiling: usize,
    pub completeness_floor: f64,
    pub acceptable_quality: f64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            enable_parallel_processing: true,
            max_worker_threads: 4,
            strict_validation: true,
            allow_calculation_errors: false,
            structural_validation: true,
            calculation_tolerance: 0.02,
            zero_tolerance: 1.0,
            critical_error_ceiling: 5,
            completeness_floor: 0.5,
            acceptable_quality: 0.7,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `XBRL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Reads a JSON configuration file; missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "XBRL_MAX_FILE_SIZE", &mut self.max_file_size)?;
        override_bool(&lookup, "XBRL_ENABLE_PARALLEL", &mut self.enable_parallel_processing)?;
        override_value(&lookup, "XBRL_MAX_WORKERS", &mut self.max_worker_threads)?;
        override_bool(&lookup, "XBRL_STRICT_VALIDATION", &mut self.strict_validation)?;
        override_bool(&lookup, "XBRL_ALLOW_CALC_ERRORS", &mut self.allow_calculation_errors)?;
        override_bool(&lookup, "XBRL_STRUCTURAL_VALIDATION", &mut self.structural_validation)?;
        override_value(&lookup, "XBRL_CALC_TOLERANCE", &mut self.calculation_tolerance)?;
        override_value(&lookup, "XBRL_ZERO_TOLERANCE", &mut self.zero_tolerance)?;
        override_value(&lookup, "XBRL_CRITICAL_ERROR_CEILING", &mut self.critical_error_ceiling)?;
        override_value(&lookup, "XBRL_COMPLETENESS_FLOOR", &mut self.completeness_floor)?;
        override_value(&lookup, "XBRL_ACCEPTABLE_QUALITY", &mut self.acceptable_quality)?;
        if let Some(level) = lookup("XBRL_LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.calculation_tolerance = tolerance;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_worker_threads = workers;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.enable_parallel_processing = false;
        self
    }

    /// Attach every report without failing on calculation mismatches.
    pub fn lenient(mut self) -> Self {
        self.strict_validation = false;
        self.allow_calculation_errors = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_worker_threads == 0 {
            return Err(Error::Config("max_worker_threads must be at least 1".into()));
        }
        if self.max_file_size == 0 {
            return Err(Error::Config("max_file_size must be positive".into()));
        }
        if !(self.calculation_tolerance > 0.0 && self.calculation_tolerance < 1.0) {
            return Err(Error::Config(format!(
                "calculation_tolerance must be in (0, 1), got {}",
                self.calculation_tolerance
            )));
        }
        if self.zero_tolerance < 0.0 {
            return Err(Error::Config("zero_tolerance must not be negative".into()));
        }
        for (name, value) in [
            ("completeness_floor", self.completeness_floor),
            ("acceptable_quality", self.acceptable_quality),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        Ok(())
    }
}

fn override_value<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", key, raw)))?;
    }
    Ok(())
}

fn override_bool<F>(lookup: &F, key: &str, target: &mut bool) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(Error::Config(format!("invalid boolean for {}: {:?}", key, raw))),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup_from(&[
                ("XBRL_MAX_WORKERS", "8"),
                ("XBRL_ENABLE_PARALLEL", "false"),
                ("XBRL_CALC_TOLERANCE", "0.01"),
                ("XBRL_LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.max_worker_threads, 8);
        assert!(!config.enable_parallel_processing);
        assert_eq!(config.calculation_tolerance, 0.01);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let err = Config::default()
            .with_overrides(lookup_from(&[("XBRL_MAX_WORKERS", "many")]))
            .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");

        let err = Config::default()
            .with_overrides(lookup_from(&[("XBRL_MAX_WORKERS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("max_worker_threads"));
    }

    #[test]
    fn test_from_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"calculation_tolerance": 0.05, "strict_validation": false}"#)
            .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.calculation_tolerance, 0.05);
        assert!(!config.strict_validation);
        assert_eq!(config.max_worker_threads, 4);
    }
}
