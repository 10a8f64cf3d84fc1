//! Configuration parsing and validation tests for Webdis.
//!
//! These tests use temporary files to avoid polluting the filesystem.

use std::io::Write;

use webdis::config::Config;

/// Tests that all configuration fields are correctly loaded from a JSON file.
#[test]
fn test_config_loading() {
    let config_json = r#"{
        "redis_host": "127.0.0.1",
        "redis_port": 6379,
        "http_host": "0.0.0.0",
        "http_port": 7379,
        "database": 0,
        "daemonize": true,
        "http_max_request_size": 1024,
        "user": "nobody",
        "group": "nogroup",
        "verbosity": 5,
        "logfile": "test.log",
        "log_fsync": "auto"
    }"#;

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{}", config_json).unwrap();
    let path = file.path().to_str().unwrap();

    let config = Config::new(path).unwrap();

    assert_eq!(config.redis_host, "127.0.0.1");
    assert_eq!(config.daemonize, true);

    assert_eq!(config.http_max_request_size, Some(1024));
    assert_eq!(config.user, Some("nobody".to_string()));
    assert_eq!(config.verbosity, Some(5));
}

/// Tests that default values are applied for missing optional fields.
#[test]
fn test_default_values() {
    let config_json = r#"{
        "redis_host": "127.0.0.1",
        "redis_port": 6379,
        "http_host": "0.0.0.0",
        "http_port": 7379,
        "database": 0
    }"#;

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{}", config_json).unwrap();
    let path = file.path().to_str().unwrap();

    let config = Config::new(path).unwrap();

    assert_eq!(config.daemonize, false);
    assert_eq!(config.http_max_request_size, None);
    assert_eq!(config.user, None);
}

/// ACL entries parse with the `cidr` field the engine's first-match-wins
/// evaluation actually reads (renamed from the teacher's `ip`).
#[test]
fn test_acl_config_parses_cidr_field() {
    let config_json = r#"{
        "redis_host": "127.0.0.1",
        "redis_port": 6379,
        "http_host": "0.0.0.0",
        "http_port": 7379,
        "database": 0,
        "acl": [
            { "disabled": ["FLUSHALL"], "cidr": "10.0.0.0/8" }
        ]
    }"#;

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{}", config_json).unwrap();
    let path = file.path().to_str().unwrap();

    let config = Config::new(path).unwrap();
    let acl = config.acl.expect("acl array should be present");
    assert_eq!(acl[0].cidr.as_deref(), Some("10.0.0.0/8"));
    assert_eq!(acl[0].disabled.as_deref(), Some(&["FLUSHALL".to_string()][..]));
}
