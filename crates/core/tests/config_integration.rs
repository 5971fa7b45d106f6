//! authwatch.toml 통합 설정 테스트
//!
//! - authwatch.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use authwatch_core::config::{AuthwatchConfig, DedupKey, SinkKind, StartPosition};
use authwatch_core::error::{AuthwatchError, ConfigError};
use authwatch_core::types::SourceKind;

// =============================================================================
// authwatch.toml.example 파싱 테스트
// =============================================================================

const EXAMPLE: &str = include_str!("../../../authwatch.toml.example");

#[test]
fn example_config_parses_successfully() {
    let config = AuthwatchConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
}

#[test]
fn example_config_passes_validation() {
    let config = AuthwatchConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_declares_both_sources() {
    let config = AuthwatchConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.tailer.sources.len(), 2);
    assert_eq!(config.tailer.sources[0].format, SourceKind::Access);
    assert_eq!(config.tailer.sources[1].format, SourceKind::Auth);
    assert_eq!(config.tailer.start_position, StartPosition::End);
}

#[test]
fn example_config_matches_builtin_detection_defaults() {
    let config = AuthwatchConfig::parse(EXAMPLE).expect("should parse");
    let defaults = AuthwatchConfig::default();

    assert_eq!(
        config.detection.bruteforce.threshold,
        defaults.detection.bruteforce.threshold
    );
    assert_eq!(
        config.detection.password_spray.distinct_users,
        defaults.detection.password_spray.distinct_users
    );
    assert_eq!(
        config.detection.sql_injection.cooldown_secs,
        defaults.detection.sql_injection.cooldown_secs
    );
    assert_eq!(config.detection.sql_injection.dedup_key, DedupKey::Auto);
    assert_eq!(config.sink.kind, SinkKind::Jsonl);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_only_sink_section() {
    let toml = r#"
[sink]
kind = "memory"
"#;
    let config = AuthwatchConfig::parse(toml).expect("should parse");
    assert_eq!(config.sink.kind, SinkKind::Memory);
    // 나머지 섹션은 기본값
    assert_eq!(config.detection.bruteforce.threshold, 5);
    assert_eq!(config.tailer.poll_interval_secs, 5);
    config.validate().expect("partial config should validate");
}

#[test]
fn explicit_empty_source_list_is_valid() {
    let toml = r#"
[tailer]
sources = []
"#;
    let config = AuthwatchConfig::parse(toml).expect("should parse");
    assert!(config.tailer.sources.is_empty());
    config.validate().expect("no sources is allowed");
}

#[test]
fn unknown_source_format_fails_to_parse() {
    let toml = r#"
[[tailer.sources]]
path = "/var/log/syslog"
format = "syslog"
"#;
    let err = AuthwatchConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        AuthwatchError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_fails_to_parse() {
    let toml = r#"
[detection.bruteforce]
threshold = "five"
"#;
    assert!(AuthwatchConfig::parse(toml).is_err());
}

#[test]
fn zero_threshold_fails_validation() {
    let toml = r#"
[detection.password_spray]
distinct_users = 0
"#;
    let config = AuthwatchConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("distinct_users"));
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_from_file_applies_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("authwatch.toml");
    tokio::fs::write(&path, "[general]\nlog_level = \"loud\"\n")
        .await
        .expect("write");

    let err = AuthwatchConfig::load(&path).await.unwrap_err();
    assert!(matches!(
        err,
        AuthwatchError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_from_file_round_trips_example() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("authwatch.toml");
    tokio::fs::write(&path, EXAMPLE).await.expect("write");

    let config = AuthwatchConfig::load(&path).await.expect("should load");
    assert_eq!(config.tailer.sources.len(), 2);
}

#[tokio::test]
async fn load_missing_file_reports_path() {
    let err = AuthwatchConfig::load("/nonexistent/authwatch.toml")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/authwatch.toml"));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_file() {
    let toml = r#"
[general]
log_level = "info"
"#;
    let result = with_env("AUTHWATCH_GENERAL_LOG_LEVEL", "error", || {
        let mut config = AuthwatchConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });
    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let result = with_env("AUTHWATCH_DETECTION_BRUTEFORCE_THRESHOLD", "12", || {
        let mut config = AuthwatchConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config.detection.bruteforce.threshold
    });
    assert_eq!(result, 12);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let result = with_env("AUTHWATCH_DETECTION_EMIT_LOGIN_ALERTS", "false", || {
        let mut config = AuthwatchConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config.detection.emit_login_alerts
    });
    assert!(!result);
}

#[test]
#[serial_test::serial]
fn env_override_sources_list() {
    let result = with_env(
        "AUTHWATCH_TAILER_SOURCES",
        "auth=/srv/app/auth.log",
        || {
            let mut config = AuthwatchConfig::parse(EXAMPLE).expect("should parse");
            config.apply_env_overrides();
            config.tailer.sources
        },
    );
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].path, "/srv/app/auth.log");
    assert_eq!(result[0].format, SourceKind::Auth);
}

#[test]
#[serial_test::serial]
fn env_override_start_position() {
    let result = with_env("AUTHWATCH_TAILER_START_POSITION", "Beginning", || {
        let mut config = AuthwatchConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config.tailer.start_position
    });
    assert_eq!(result, StartPosition::Beginning);
}

#[test]
#[serial_test::serial]
fn invalid_env_value_keeps_file_value() {
    let result = with_env("AUTHWATCH_SINK_QUEUE_CAPACITY", "lots", || {
        let mut config = AuthwatchConfig::parse("[sink]\nqueue_capacity = 8\n").expect("parse");
        config.apply_env_overrides();
        config.sink.queue_capacity
    });
    assert_eq!(result, 8);
}
