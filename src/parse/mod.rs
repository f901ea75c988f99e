mod entry;

pub use entry::{parse_entry, ConfigError};

use anyhow::Context;
use serde::Deserialize;
use serde_yaml::Value;
use std::{collections::BTreeMap, fs, time::Duration};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";

fn default_stop_timeout() -> u64 { 5 }
fn default_log_dir() -> String { String::from("logs") }

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Seconds a stopping process gets between SIGTERM and SIGKILL.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    // Entries stay raw; each instance validates its own.
    #[serde(default)]
    pub services: BTreeMap<String, Value>,
}

impl Config {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }
}

/*
    @@@
    @parser();
    . Reads the content of the config file into a String. Any I/O error is returned with the path attached.
    . Hands the raw YAML text to serde_yaml. Malformed YAML is an error, an invalid service entry is not.
*/
pub fn parser(path: &str) -> anyhow::Result<Config> {
    let yaml_file = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let parsed_config: Config =
        serde_yaml::from_str(&yaml_file).with_context(|| format!("parsing {}", path))?;
    Ok(parsed_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cfg: Config = serde_yaml::from_str("services: {}").unwrap();
        assert_eq!(cfg.stop_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.log_dir, "logs");
        assert!(cfg.services.is_empty());
    }

    #[test]
    fn bad_entries_still_load() {
        let cfg: Config = serde_yaml::from_str(
            r#"
            stop_timeout: 2
            services:
              good: { command: [/bin/true] }
              bad: { command: [] }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.stop_timeout, 2);
        assert_eq!(cfg.services.len(), 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = parser("/nonexistent/instanced.yml").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/instanced.yml"));
    }
}
