// Kernel configuration

use crate::error::{Error, Result};
use crate::payload::JsonOptions;
use serde::Deserialize;
use std::path::Path;

/// Settings applied by [`Kernel::with_config`](crate::Kernel::with_config).
///
/// Loadable from TOML or from `TRELLIS_*` environment variables. Missing
/// keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Render diagnostic pages instead of canned error messages.
    pub debug: bool,
    /// Path to dispatch instead of the request's own path.
    pub request_uri: Option<String>,
    pub json_best_effort: bool,
    pub json_pretty: bool,
    /// Charset appended to the default content type on emission.
    pub charset: String,
    /// Report converted faults through `tracing`.
    pub log_faults: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            debug: false,
            request_uri: None,
            json_best_effort: false,
            json_pretty: false,
            charset: "UTF-8".to_string(),
            log_faults: false,
        }
    }
}

impl KernelConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Read `TRELLIS_DEBUG`, `TRELLIS_REQUEST_URI`, `TRELLIS_JSON_BEST_EFFORT`
    /// and `TRELLIS_LOG_FAULTS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup("TRELLIS_DEBUG") {
            config.debug = parse_flag("TRELLIS_DEBUG", &value)?;
        }
        if let Some(uri) = lookup("TRELLIS_REQUEST_URI").filter(|u| !u.is_empty()) {
            config.request_uri = Some(uri);
        }
        if let Some(value) = lookup("TRELLIS_JSON_BEST_EFFORT") {
            config.json_best_effort = parse_flag("TRELLIS_JSON_BEST_EFFORT", &value)?;
        }
        if let Some(value) = lookup("TRELLIS_LOG_FAULTS") {
            config.log_faults = parse_flag("TRELLIS_LOG_FAULTS", &value)?;
        }
        Ok(config)
    }

    pub fn json_options(&self) -> JsonOptions {
        JsonOptions::default()
            .pretty(self.json_pretty)
            .best_effort(self.json_best_effort)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert!(!config.debug);
        assert_eq!(config.charset, "UTF-8");
        assert_eq!(config.json_options(), JsonOptions::default());
    }

    #[test]
    fn test_from_toml() {
        let config = KernelConfig::from_toml_str(
            r#"
            debug = true
            request_uri = "/override"
            json_pretty = true
            "#,
        )
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.request_uri.as_deref(), Some("/override"));
        assert!(config.json_options().pretty);
        assert!(!config.log_faults);
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        assert!(matches!(
            KernelConfig::from_toml_str("debug = \"maybe\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_lookup() {
        let config = KernelConfig::from_lookup(lookup(&[
            ("TRELLIS_DEBUG", "yes"),
            ("TRELLIS_REQUEST_URI", "/a/b"),
            ("TRELLIS_JSON_BEST_EFFORT", "1"),
        ]))
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.request_uri.as_deref(), Some("/a/b"));
        assert!(config.json_best_effort);
    }

    #[test]
    fn test_from_lookup_rejects_bad_flag() {
        let result = KernelConfig::from_lookup(lookup(&[("TRELLIS_DEBUG", "sometimes")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
