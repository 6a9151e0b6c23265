//! Runtime configuration (spec ambient stack).
//!
//! Grounded on the teacher's `config.rs`: a plain struct loaded from a YAML
//! file with environment-variable overrides, rather than a config crate —
//! this keeps the surface small enough to hand-validate at startup.
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_page_size() -> usize {
    50
}

fn default_max_batches() -> u32 {
    100
}

fn default_soft_deadline_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cloud_base_url: String,
    pub data_dir: PathBuf,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_batches")]
    pub max_batches: u32,
    #[serde(default = "default_soft_deadline_secs")]
    pub soft_deadline_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn soft_deadline(&self) -> Duration {
        Duration::from_secs(self.soft_deadline_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_omitted() {
        let cfg = Config::from_yaml_str(
            "cloud_base_url: https://cloud.example\ndata_dir: /tmp/veil\n",
        )
        .unwrap();
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.max_batches, 100);
        assert_eq!(cfg.soft_deadline_secs, 300);
    }
}
