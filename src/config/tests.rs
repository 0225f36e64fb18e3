use {
    crate::config::{ApplyConfig, ConfigError},
    std::{path::Path, time::Duration},
};

#[test]
fn empty_object_uses_defaults() {
    let config = ApplyConfig::parse("{}").unwrap();
    assert_eq!(config.power_timeout, Duration::from_millis(100));
    assert_eq!(config.flush_retries, 10);
    assert_eq!(config.flush_interval, Duration::from_millis(20));
    assert_eq!(config.max_irq_handlers, 32);
}

#[test]
fn durations_use_humantime() {
    let config = ApplyConfig::parse(
        r#"{ "power-timeout": "1s 500ms", "flush-interval": "5ms", "flush-retries": 3 }"#,
    )
    .unwrap();
    assert_eq!(config.power_timeout, Duration::from_millis(1500));
    assert_eq!(config.flush_interval, Duration::from_millis(5));
    assert_eq!(config.flush_retries, 3);
    assert_eq!(config.vsync_interval, Duration::from_millis(16));
}

#[test]
fn invalid_duration_is_rejected() {
    assert!(ApplyConfig::parse(r#"{ "power-timeout": "soon" }"#).is_err());
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(ApplyConfig::parse(r#"{ "power-timeout-ms": 5 }"#).is_err());
}

#[test]
fn missing_file() {
    let res = ApplyConfig::load(Path::new("/nonexistent/dss-apply.json"));
    assert!(matches!(res, Err(ConfigError::Read(..))));
}
