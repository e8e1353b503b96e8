//! Scenario: unused config keys.
//!
//! # Invariants under test
//! - Warn mode reports unused leaves without erroring.
//! - Fail mode errors with CONFIG_UNUSED_KEYS.
//! - Keys under consumed sections are never flagged.
//! - Reported pointers are sorted.

use stk_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

const YAML: &str = r#"
bulk:
  max_attempts: 12
marketplace:
  listings_page_size: 50
zeta:
  enabled: true
alpha:
  legacy_flag: 1
"#;

#[test]
fn warn_mode_reports_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/alpha/legacy_flag".to_string(), "/zeta/enabled".to_string()]
    );
}

#[test]
fn fail_mode_errors() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS"), "got: {msg}");
    assert!(msg.contains("/zeta/enabled"), "got: {msg}");
}

#[test]
fn consumed_sections_are_clean() {
    let yaml = r#"
primary:
  api_version: "2021-01"
store:
  database_url_env: "STK_DATABASE_URL"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
