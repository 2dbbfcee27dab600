pub mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use anyhow::Result;
use std::path::Path;

impl DaemonConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides for the handful of settings an operator commonly
    /// needs without editing the file. When the file does not exist,
    /// built-in defaults are used.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: DaemonConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            DaemonConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded dnstrigd configuration");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DNSTRIGD_CONTROL_PORT") {
            if let Ok(n) = v.parse::<u16>() {
                self.control_port = n;
            }
        }
        if let Ok(v) = std::env::var("DNSTRIGD_SERVER_CERT_FILE") {
            self.server_cert_file = v;
        }
        if let Ok(v) = std::env::var("DNSTRIGD_SERVER_KEY_FILE") {
            self.server_key_file = v;
        }
        if let Ok(v) = std::env::var("DNSTRIGD_RESOLVCONF") {
            self.resolvconf = v;
        }
        if let Ok(v) = std::env::var("DNSTRIGD_NOACTION") {
            self.noaction = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("DNSTRIGD_CHECK_UPDATES") {
            self.check_updates = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("DNSTRIGD_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.control_port == 0 {
            anyhow::bail!("control_port must be nonzero");
        }
        if self.server_cert_file.is_empty() {
            anyhow::bail!("server_cert_file must not be empty");
        }
        if self.server_key_file.is_empty() {
            anyhow::bail!("server_key_file must not be empty");
        }
        if self.max_active == 0 {
            anyhow::bail!("max_active must be nonzero");
        }
        if self.retry.count_max == 0 {
            anyhow::bail!("retry.count_max must be nonzero");
        }
        if self.retry.max_secs < self.retry.start_secs {
            anyhow::bail!("retry.max_secs must be >= retry.start_secs");
        }
        Ok(())
    }
}
