use std::path::PathBuf;

use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_openwrt_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("OPENWRT__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = BindConfig::default();

    assert_eq!(config.uci.config_dir, PathBuf::from("/etc/config"));
    assert!(!config.uci.overwrite_on_commit);
    assert!(!config.uci.strict_kinds);
    assert_eq!(config.ubus.socket_path, PathBuf::from("/var/run/ubus/ubus.sock"));
    assert_eq!(config.ubus.invoke_retries, 5);
    assert_eq!(config.ubus.reconnect_interval_ms, 1000);
    assert!(config.ubus.reconnect);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_openwrt_env_vars();
    with_vars(
        vec![
            ("OPENWRT__UBUS__INVOKE_RETRIES", Some("7")),
            ("OPENWRT__UBUS__SOCKET_PATH", Some("/tmp/test-ubus.sock")),
        ],
        || {
            let config = BindConfig::new().unwrap();

            assert_eq!(config.ubus.invoke_retries, 7);
            assert_eq!(config.ubus.socket_path, PathBuf::from("/tmp/test-ubus.sock"));
            assert_eq!(config.uci.config_dir, PathBuf::from("/etc/config"));
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_openwrt_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");

    std::fs::write(
        &config_path,
        r#"
        [uci]
        config_dir = "/tmp/uci-config"
        strict_kinds = true

        [ubus]
        reconnect_interval_ms = 250
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = BindConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.uci.config_dir, PathBuf::from("/tmp/uci-config"));
        assert!(config.uci.strict_kinds);
        assert_eq!(config.ubus.reconnect_interval_ms, 250);
        assert_eq!(config.ubus.invoke_retries, 5);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_openwrt_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("bind.toml");
    std::fs::write(
        &config_path,
        r#"
        [ubus]
        default_timeout_ms = 100
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("OPENWRT__UBUS__DEFAULT_TIMEOUT_MS", Some("900")),
        ],
        || {
            let config = BindConfig::new().unwrap();
            assert_eq!(config.ubus.default_timeout_ms, 900);
        },
    );
}

#[test]
fn validation_should_reject_zero_invoke_retries() {
    let mut config = BindConfig::default();
    config.ubus.invoke_retries = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_empty_config_dir() {
    let mut config = BindConfig::default();
    config.uci.config_dir = PathBuf::new();

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_accept_defaults() {
    assert!(BindConfig::default().validate().is_ok());
}

#[test]
fn package_path_joins_config_dir() {
    let config = UciConfig::with_config_dir("/tmp/cfg");
    assert_eq!(config.package_path("network"), PathBuf::from("/tmp/cfg/network"));
}
