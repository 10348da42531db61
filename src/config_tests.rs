#![cfg(test)]

use super::config::*;
use std::collections::HashMap;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.gateway.port, 8000);
    assert_eq!(config.gateway.candidates.len(), 4);
    assert_eq!(config.statistics.lookback_days, 7);
    assert_eq!(config.sync.interval_minutes, 30);
    assert!(config.account.cookie.is_none());
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.utility.url_root = String::new();
    assert!(config.validate().is_err());

    config = Config::default();
    config.gateway.candidates.clear();
    assert!(config.validate().is_err());
    config.gateway.fixed_url = Some("http://localhost:8000".to_string());
    assert!(config.validate().is_ok());

    config = Config::default();
    config.statistics.timezone = "Mars/Olympus".to_string();
    assert!(config.validate().is_err());

    config = Config::default();
    config.statistics.glitch_cap_kwh = 2000.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(config.gateway.port, deserialized.gateway.port);
    assert_eq!(config.statistics.timezone, deserialized.statistics.timezone);
}

#[test]
fn partial_yaml_keeps_defaults() {
    let yaml = "account:\n  username: me@example.com\n  password: hunter2\nsync:\n  interval_minutes: 15\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.account.username, "me@example.com");
    assert_eq!(config.sync.interval_minutes, 15);
    assert_eq!(config.gateway.probe_timeout_ms, 3_000);
    assert!(config.require_credentials().is_ok());
}

#[test]
fn env_overrides_apply_supervisor_then_explicit_url() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("PSEGLI_USERNAME", "user"),
        ("PSEGLI_COOKIE", "MM_SID=abc"),
        ("SUPERVISOR_TOKEN", "sup-token"),
        ("PSEGLI_PASSWORD", "   "),
    ]);
    let mut config = Config::default();
    config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

    assert_eq!(config.account.username, "user");
    assert_eq!(config.account.cookie.as_deref(), Some("MM_SID=abc"));
    assert_eq!(config.statistics.ha_url, "http://supervisor/core");
    assert_eq!(config.statistics.ha_token, "sup-token");
    // blank values are ignored
    assert!(config.account.password.is_empty());
}

#[test]
fn debug_output_redacts_secrets() {
    let mut config = Config::default();
    config.account.password = "hunter2".to_string();
    config.statistics.ha_token = "tok".to_string();
    let dbg = format!("{:?}", config);
    assert!(!dbg.contains("hunter2"));
    assert!(!dbg.contains("\"tok\""));
}
