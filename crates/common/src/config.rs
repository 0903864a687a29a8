//! # Annotator Configuration
//!
//! Every external input of an annotation run, layered as
//! defaults → `optimist.toml` → `OPTIMIST_*` environment → command line.
//! The CLI owns the last layer; this module owns the first three.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name looked up in the working directory.
pub const CONFIG_FILE: &str = "optimist.toml";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid function pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Global control string, consumed once at instance 0.
    pub control: String,
    /// Unresolved sites take the most aggressive choice instead of none.
    pub default_optimistic: bool,
    /// Number of eligible pass instances; negative means unlimited.
    pub runs: i64,
    /// Allow-list of function name patterns (unanchored). Empty allows all.
    pub only_functions: Vec<String>,
    pub print_choices: bool,
    pub print_opportunities: bool,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            control: String::new(),
            default_optimistic: false,
            runs: -1,
            only_functions: Vec::new(),
            print_choices: false,
            print_opportunities: false,
        }
    }
}

impl AnnotatorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Applies `OPTIMIST_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(control) = lookup("OPTIMIST_CONTROL") {
            self.control = control;
        }
        if let Some(value) = lookup("OPTIMIST_DEFAULT_OPTIMISTIC") {
            self.default_optimistic = parse_bool(&value).ok_or(ConfigError::InvalidEnv {
                var: "OPTIMIST_DEFAULT_OPTIMISTIC",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("OPTIMIST_RUNS") {
            self.runs = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "OPTIMIST_RUNS",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("OPTIMIST_ONLY_FUNCTIONS") {
            self.only_functions = split_patterns(&value);
        }
        Ok(())
    }

    /// Run limit for the instance coordinator; `None` is unlimited.
    pub fn run_limit(&self) -> Option<u32> {
        if self.runs < 0 {
            None
        } else {
            Some(u32::try_from(self.runs).unwrap_or(u32::MAX))
        }
    }

    /// Compiles the allow-list. Any invalid pattern is fatal.
    pub fn validate(&self) -> Result<FunctionFilter, ConfigError> {
        FunctionFilter::new(&self.only_functions)
    }
}

/// Splits a comma separated pattern list, dropping empty items.
pub fn split_patterns(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Compiled function allow-list.
#[derive(Debug, Clone, Default)]
pub struct FunctionFilter {
    patterns: Vec<Regex>,
}

impl FunctionFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| ConfigError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Allows everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, function_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(function_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.runs, -1);
        assert_eq!(config.run_limit(), None);
        assert!(!config.default_optimistic);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_toml_partial() {
        let config = AnnotatorConfig::from_toml_str(
            r##"
control = "#f0f#c622"
runs = 2
only_functions = ["^compute", "main"]
"##,
        )
        .unwrap();
        assert_eq!(config.control, "#f0f#c622");
        assert_eq!(config.run_limit(), Some(2));
        assert_eq!(config.only_functions.len(), 2);
        assert!(!config.print_choices);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnnotatorConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, AnnotatorConfig::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "default_optimistic = true\nprint_opportunities = true\n").unwrap();
        let config = AnnotatorConfig::load(&path).unwrap();
        assert!(config.default_optimistic);
        assert!(config.print_opportunities);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPTIMIST_CONTROL", "#f1f#c41"),
            ("OPTIMIST_DEFAULT_OPTIMISTIC", "yes"),
            ("OPTIMIST_RUNS", "3"),
            ("OPTIMIST_ONLY_FUNCTIONS", "foo, ,bar"),
        ]
        .into_iter()
        .collect();
        let mut config = AnnotatorConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.control, "#f1f#c41");
        assert!(config.default_optimistic);
        assert_eq!(config.runs, 3);
        assert_eq!(config.only_functions, vec!["foo", "bar"]);
    }

    #[test]
    fn test_env_rejects_bad_runs() {
        let mut config = AnnotatorConfig::default();
        let err = config
            .apply_env_from(|k| (k == "OPTIMIST_RUNS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "OPTIMIST_RUNS", .. }));
    }

    #[test]
    fn test_filter_unanchored() {
        let filter = FunctionFilter::new(&["comp"]).unwrap();
        assert!(filter.matches("compute"));
        assert!(filter.matches("precompute"));
        assert!(!filter.matches("main"));
        assert!(FunctionFilter::all().matches("anything"));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let config = AnnotatorConfig {
            only_functions: vec!["ok".into(), "(unclosed".into()],
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }
}
