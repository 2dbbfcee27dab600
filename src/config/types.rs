use serde::{Deserialize, Serialize};

/// Top-level daemon configuration — everything the control server, state
/// engine, retry scheduler and resolver-hook arbiter need at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Loopback TCP port the control server listens on.
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Server certificate file. Also doubles as the mutual-TLS trust
    /// anchor: a connecting panel must present a cert signed by or equal
    /// to this one.
    #[serde(default = "default_server_cert_file")]
    pub server_cert_file: String,

    /// Server private key file, paired with `server_cert_file`.
    #[serde(default = "default_server_key_file")]
    pub server_key_file: String,

    /// Target resolv.conf-style file the resolver-hook arbiter manages
    /// on UNIX.
    #[serde(default = "default_resolvconf")]
    pub resolvconf: String,

    /// Optional `domain` line emitted by the arbiter's loopback posture.
    #[serde(default)]
    pub rescf_domain: Option<String>,

    /// Optional `search` line emitted by the arbiter's loopback posture.
    #[serde(default)]
    pub rescf_search: Option<String>,

    /// Dry-run: resolver-hook primitives become no-ops. Useful for tests
    /// and for running the daemon without root.
    #[serde(default)]
    pub noaction: bool,

    /// Whether the update collaborator is allowed to fire update checks.
    #[serde(default = "default_true")]
    pub check_updates: bool,

    /// Maximum simultaneous panel connections; excess accepts are closed
    /// with a warning.
    #[serde(default = "default_max_active")]
    pub max_active: usize,

    /// First line written into the managed resolv.conf, and the line the
    /// idempotence check looks for.
    #[serde(default = "default_server_signature")]
    pub server_signature: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub retry: RetryTimerConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            server_cert_file: default_server_cert_file(),
            server_key_file: default_server_key_file(),
            resolvconf: default_resolvconf(),
            rescf_domain: None,
            rescf_search: None,
            noaction: false,
            check_updates: default_true(),
            max_active: default_max_active(),
            server_signature: default_server_signature(),
            log_level: default_log_level(),
            retry: RetryTimerConfig::default(),
        }
    }
}

fn default_control_port() -> u16 {
    8955
}

fn default_server_cert_file() -> String {
    "/etc/dnstrigd/dnstrigd_server.pem".to_string()
}

fn default_server_key_file() -> String {
    "/etc/dnstrigd/dnstrigd_server.key".to_string()
}

fn default_resolvconf() -> String {
    "/etc/resolv.conf".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_active() -> usize {
    32
}

fn default_server_signature() -> String {
    "# Generated by dnstrigd\n".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reprobe / tcp-recheck timer tuning, mirroring `RETRY_TIMER_START`,
/// `RETRY_TIMER_COUNT_MAX`, `RETRY_TIMER_MAX` and `SVR_TCP_RETRY` from the
/// original daemon's retry scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTimerConfig {
    #[serde(default = "default_retry_start_secs")]
    pub start_secs: u64,

    #[serde(default = "default_retry_count_max")]
    pub count_max: u32,

    #[serde(default = "default_retry_max_secs")]
    pub max_secs: u64,

    #[serde(default = "default_tcp_retry_secs")]
    pub tcp_retry_secs: u64,
}

impl Default for RetryTimerConfig {
    fn default() -> Self {
        Self {
            start_secs: default_retry_start_secs(),
            count_max: default_retry_count_max(),
            max_secs: default_retry_max_secs(),
            tcp_retry_secs: default_tcp_retry_secs(),
        }
    }
}

fn default_retry_start_secs() -> u64 {
    3
}

fn default_retry_count_max() -> u32 {
    5
}

fn default_retry_max_secs() -> u64 {
    3600
}

fn default_tcp_retry_secs() -> u64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_config_defaults() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.control_port, 8955);
        assert_eq!(cfg.max_active, 32);
        assert!(cfg.check_updates);
        assert!(!cfg.noaction);
        assert_eq!(cfg.retry.start_secs, 3);
        assert_eq!(cfg.retry.count_max, 5);
        assert_eq!(cfg.retry.max_secs, 3600);
        assert_eq!(cfg.retry.tcp_retry_secs, 20);
    }

    #[test]
    fn test_daemon_config_partial_toml_fills_defaults() {
        let toml_str = r#"
control_port = 9100
"#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.control_port, 9100);
        assert_eq!(cfg.max_active, 32);
        assert_eq!(cfg.server_cert_file, default_server_cert_file());
    }

    #[test]
    fn test_daemon_config_rescf_domain_search() {
        let json = r#"{"rescf_domain": "example.com", "rescf_search": "example.com corp.example.com"}"#;
        let cfg: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.rescf_domain, Some("example.com".to_string()));
        assert_eq!(
            cfg.rescf_search,
            Some("example.com corp.example.com".to_string())
        );
    }
}
