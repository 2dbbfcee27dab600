use super::types::*;
use super::DaemonConfig;
use std::io::Write as _;
use std::path::Path;

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = DaemonConfig::load(Path::new("/nonexistent/dnstrigd.toml")).unwrap();
    assert_eq!(cfg.control_port, 8955);
    assert_eq!(cfg.max_active, 32);
}

#[test]
fn test_load_toml_config() {
    let toml_str = r#"
control_port = 9100
resolvconf = "/tmp/resolv.conf"
noaction = true
"#;
    let mut tmp = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    tmp.write_all(toml_str.as_bytes()).unwrap();
    let cfg = DaemonConfig::load(tmp.path()).unwrap();
    assert_eq!(cfg.control_port, 9100);
    assert_eq!(cfg.resolvconf, "/tmp/resolv.conf");
    assert!(cfg.noaction);
}

#[test]
fn test_load_json_config() {
    let json = r#"{
        "control_port": 9200,
        "rescf_domain": "example.com",
        "check_updates": false
    }"#;
    let mut tmp = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    tmp.write_all(json.as_bytes()).unwrap();
    let cfg = DaemonConfig::load(tmp.path()).unwrap();
    assert_eq!(cfg.control_port, 9200);
    assert_eq!(cfg.rescf_domain, Some("example.com".to_string()));
    assert!(!cfg.check_updates);
}

#[test]
fn test_validate_zero_port_fails() {
    let cfg = DaemonConfig {
        control_port: 0,
        ..DaemonConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_empty_cert_path_fails() {
    let cfg = DaemonConfig {
        server_cert_file: String::new(),
        ..DaemonConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_zero_max_active_fails() {
    let cfg = DaemonConfig {
        max_active: 0,
        ..DaemonConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_retry_max_below_start_fails() {
    let cfg = DaemonConfig {
        retry: RetryTimerConfig {
            start_secs: 100,
            max_secs: 10,
            ..RetryTimerConfig::default()
        },
        ..DaemonConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_valid_config() {
    let cfg = DaemonConfig::default();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_unsupported_format() {
    let mut tmp = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    tmp.write_all(b"key: value").unwrap();
    assert!(DaemonConfig::load(tmp.path()).is_err());
}

#[test]
fn test_env_override_control_port() {
    std::env::set_var("DNSTRIGD_CONTROL_PORT", "12345");
    let cfg = DaemonConfig::load(Path::new("/nonexistent/dnstrigd.toml")).unwrap();
    assert_eq!(cfg.control_port, 12345);
    std::env::remove_var("DNSTRIGD_CONTROL_PORT");
}
