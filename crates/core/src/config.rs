//! 설정 관리 — authwatch.toml 파싱 및 런타임 설정
//!
//! [`AuthwatchConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 로그 레벨/형식만)
//! 2. 환경변수 (`AUTHWATCH_SINK_PATH=/tmp/alerts.jsonl` 형식)
//! 3. 설정 파일 (`authwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), authwatch_core::error::AuthwatchError> {
//! use authwatch_core::config::AuthwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = AuthwatchConfig::load("authwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = AuthwatchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuthwatchError, ConfigError};
use crate::types::SourceKind;

/// authwatch 통합 설정
///
/// `authwatch.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파일 테일러 설정
    #[serde(default)]
    pub tailer: TailerConfig,
    /// 탐지 규칙 설정
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 알림 싱크 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AuthwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AuthwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuthwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AuthwatchError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AuthwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            AuthwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `AUTHWATCH_{SECTION}_{FIELD}`
    /// 예: `AUTHWATCH_DETECTION_BRUTEFORCE_THRESHOLD=10`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "AUTHWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "AUTHWATCH_GENERAL_LOG_FORMAT");

        // Tailer
        override_sources(&mut self.tailer.sources, "AUTHWATCH_TAILER_SOURCES");
        override_u64(
            &mut self.tailer.poll_interval_secs,
            "AUTHWATCH_TAILER_POLL_INTERVAL_SECS",
        );
        override_u64(&mut self.tailer.io_timeout_ms, "AUTHWATCH_TAILER_IO_TIMEOUT_MS");
        if let Ok(val) = std::env::var("AUTHWATCH_TAILER_START_POSITION") {
            match StartPosition::from_str_loose(&val) {
                Some(pos) => self.tailer.start_position = pos,
                None => warn!(
                    env_key = "AUTHWATCH_TAILER_START_POSITION",
                    value = val.as_str(),
                    "unknown start position in env var, ignoring"
                ),
            }
        }

        // Detection
        override_u64(
            &mut self.detection.sweep_interval_secs,
            "AUTHWATCH_DETECTION_SWEEP_INTERVAL_SECS",
        );
        override_bool(
            &mut self.detection.emit_login_alerts,
            "AUTHWATCH_DETECTION_EMIT_LOGIN_ALERTS",
        );
        override_u32(
            &mut self.detection.bruteforce.threshold,
            "AUTHWATCH_DETECTION_BRUTEFORCE_THRESHOLD",
        );
        override_u64(
            &mut self.detection.bruteforce.window_secs,
            "AUTHWATCH_DETECTION_BRUTEFORCE_WINDOW_SECS",
        );
        override_u64(
            &mut self.detection.bruteforce.cooldown_secs,
            "AUTHWATCH_DETECTION_BRUTEFORCE_COOLDOWN_SECS",
        );
        override_u32(
            &mut self.detection.password_spray.distinct_users,
            "AUTHWATCH_DETECTION_PASSWORD_SPRAY_DISTINCT_USERS",
        );
        override_u64(
            &mut self.detection.password_spray.window_secs,
            "AUTHWATCH_DETECTION_PASSWORD_SPRAY_WINDOW_SECS",
        );
        override_u64(
            &mut self.detection.password_spray.cooldown_secs,
            "AUTHWATCH_DETECTION_PASSWORD_SPRAY_COOLDOWN_SECS",
        );
        override_u64(
            &mut self.detection.sql_injection.cooldown_secs,
            "AUTHWATCH_DETECTION_SQL_INJECTION_COOLDOWN_SECS",
        );

        // Sink
        override_string(&mut self.sink.path, "AUTHWATCH_SINK_PATH");
        override_usize(&mut self.sink.queue_capacity, "AUTHWATCH_SINK_QUEUE_CAPACITY");
        override_u64(&mut self.sink.write_timeout_ms, "AUTHWATCH_SINK_WRITE_TIMEOUT_MS");

        // Metrics
        override_bool(&mut self.metrics.enabled, "AUTHWATCH_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "AUTHWATCH_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "AUTHWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 음수/0 윈도우 같은 불변식 위반은 시작 시점에 바로 실패시킵니다.
    pub fn validate(&self) -> Result<(), AuthwatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.tailer.validate()?;
        self.detection.validate()?;
        self.sink.validate()?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when metrics are enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> AuthwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 테일러 시작 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// 파일 처음부터 읽기
    Beginning,
    /// 현재 파일 끝부터 읽기 (기본값)
    #[default]
    End,
}

impl StartPosition {
    /// 문자열에서 시작 위치를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginning" | "start" => Some(Self::Beginning),
            "end" | "tail" => Some(Self::End),
            _ => None,
        }
    }
}

/// 감시 대상 로그 파일
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 파일 경로
    pub path: String,
    /// 로그 형식 (access, auth)
    pub format: SourceKind,
}

/// 파일 테일러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailerConfig {
    /// 감시할 로그 파일 목록
    pub sources: Vec<SourceConfig>,
    /// 변경 알림을 놓쳤을 때를 대비한 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 시작 위치 (beginning, end)
    pub start_position: StartPosition,
    /// 최대 라인 길이 (바이트). 초과 라인은 버립니다.
    pub max_line_length: usize,
    /// 파일 stat/open/read 타임아웃 (밀리초)
    pub io_timeout_ms: u64,
    /// 테일러 → 엔진 이벤트 채널 용량
    pub channel_capacity: usize,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceConfig {
                    path: "/var/log/nginx/access.log".to_owned(),
                    format: SourceKind::Access,
                },
                SourceConfig {
                    path: "/var/log/webapp/auth.log".to_owned(),
                    format: SourceKind::Auth,
                },
            ],
            poll_interval_secs: 5,
            start_position: StartPosition::End,
            max_line_length: 64 * 1024, // 64KB
            io_timeout_ms: 2_000,
            channel_capacity: 1024,
        }
    }
}

impl TailerConfig {
    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// I/O 타임아웃
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// 섹션 값을 검증합니다.
    pub fn validate(&self) -> Result<(), AuthwatchError> {
        const MAX_POLL_INTERVAL_SECS: u64 = 3600;

        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(invalid(
                "tailer.poll_interval_secs",
                format!("must be 1-{MAX_POLL_INTERVAL_SECS}"),
            ));
        }
        if self.max_line_length == 0 {
            return Err(invalid("tailer.max_line_length", "must be greater than 0"));
        }
        if self.io_timeout_ms == 0 {
            return Err(invalid("tailer.io_timeout_ms", "must be greater than 0"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("tailer.channel_capacity", "must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.path.trim().is_empty() {
                return Err(invalid("tailer.sources", "source path must not be empty"));
            }
            if !seen.insert(source.path.as_str()) {
                return Err(invalid(
                    "tailer.sources",
                    format!("duplicate source path '{}'", source.path),
                ));
            }
        }
        Ok(())
    }
}

/// 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 탐지기 상태 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// 모든 로그인 이벤트에 대해 감사용 `alert_login` 알림을 생성할지 여부
    pub emit_login_alerts: bool,
    /// 무차별 대입 규칙
    pub bruteforce: BruteforceConfig,
    /// 패스워드 스프레이 규칙
    pub password_spray: PasswordSprayConfig,
    /// SQL 인젝션 규칙
    pub sql_injection: SqlInjectionConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 120,
            emit_login_alerts: true,
            bruteforce: BruteforceConfig::default(),
            password_spray: PasswordSprayConfig::default(),
            sql_injection: SqlInjectionConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// 정리 주기
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 섹션 값을 검증합니다.
    pub fn validate(&self) -> Result<(), AuthwatchError> {
        if self.sweep_interval_secs == 0 {
            return Err(invalid("detection.sweep_interval_secs", "must be greater than 0"));
        }

        let bf = &self.bruteforce;
        if bf.enabled {
            if bf.threshold == 0 {
                return Err(invalid("detection.bruteforce.threshold", "must be greater than 0"));
            }
            if bf.window_secs == 0 {
                return Err(invalid("detection.bruteforce.window_secs", "must be greater than 0"));
            }
        }

        let ps = &self.password_spray;
        if ps.enabled {
            if ps.distinct_users == 0 {
                return Err(invalid(
                    "detection.password_spray.distinct_users",
                    "must be greater than 0",
                ));
            }
            if ps.window_secs == 0 {
                return Err(invalid(
                    "detection.password_spray.window_secs",
                    "must be greater than 0",
                ));
            }
        }

        if self
            .sql_injection
            .extra_signatures
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(invalid(
                "detection.sql_injection.extra_signatures",
                "signatures must not be empty",
            ));
        }

        Ok(())
    }
}

/// 무차별 대입 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BruteforceConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 윈도우 내 실패 횟수 임계값
    pub threshold: u32,
    /// 윈도우 길이 (초)
    pub window_secs: u64,
    /// 같은 사용자에 대한 재알림 금지 기간 (초)
    pub cooldown_secs: u64,
    /// 알림 후 누적 시도를 비울지 여부
    pub reset_on_alert: bool,
}

impl Default for BruteforceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            window_secs: 60,
            cooldown_secs: 60,
            reset_on_alert: true,
        }
    }
}

/// 패스워드 스프레이 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSprayConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 윈도우 내 서로 다른 사용자 수 임계값
    pub distinct_users: u32,
    /// 윈도우 길이 (초)
    pub window_secs: u64,
    /// 같은 비밀번호에 대한 재알림 금지 기간 (초)
    pub cooldown_secs: u64,
    /// 알림 후 누적 시도를 비울지 여부
    pub reset_on_alert: bool,
}

impl Default for PasswordSprayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distinct_users: 2,
            window_secs: 60,
            cooldown_secs: 60,
            reset_on_alert: true,
        }
    }
}

/// SQL 인젝션 중복 제거 키
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    /// 클라이언트 주소가 있으면 주소, 없으면 사용자명
    #[default]
    Auto,
    /// 항상 클라이언트 주소 (없으면 사용자명으로 대체)
    SourceAddr,
    /// 항상 사용자명
    Username,
}

/// SQL 인젝션 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlInjectionConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 같은 키에 대한 재알림 금지 기간 (초)
    pub cooldown_secs: u64,
    /// 중복 제거 키
    pub dedup_key: DedupKey,
    /// 기본 시그니처에 추가할 문자열 (대소문자 무시)
    pub extra_signatures: Vec<String>,
}

impl Default for SqlInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 5,
            dedup_key: DedupKey::Auto,
            extra_signatures: Vec::new(),
        }
    }
}

/// 싱크 백엔드 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// append-only JSON lines 파일
    #[default]
    Jsonl,
    /// 프로세스 메모리 (테스트/임베딩용)
    Memory,
}

/// 알림 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 백엔드 종류
    pub kind: SinkKind,
    /// JSON lines 파일 경로
    pub path: String,
    /// 디스패처 큐 용량
    pub queue_capacity: usize,
    /// 알림 하나당 기록 타임아웃 (밀리초)
    pub write_timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Jsonl,
            path: "/var/lib/authwatch/alerts.jsonl".to_owned(),
            queue_capacity: 1024,
            write_timeout_ms: 2_000,
        }
    }
}

impl SinkConfig {
    /// 기록 타임아웃
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// 섹션 값을 검증합니다.
    pub fn validate(&self) -> Result<(), AuthwatchError> {
        if self.kind == SinkKind::Jsonl && self.path.trim().is_empty() {
            return Err(invalid("sink.path", "must not be empty for the jsonl sink"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("sink.queue_capacity", "must be greater than 0"));
        }
        if self.write_timeout_ms == 0 {
            return Err(invalid("sink.write_timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Prometheus 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9117,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

/// `format=path` 쌍을 쉼표로 구분한 형식입니다.
///
/// 예: `access=/var/log/nginx/access.log,auth=/var/log/webapp/auth.log`
/// 하나라도 잘못된 항목이 있으면 전체를 무시합니다.
fn override_sources(target: &mut Vec<SourceConfig>, env_key: &str) {
    let Ok(val) = std::env::var(env_key) else {
        return;
    };

    let mut sources = Vec::new();
    for item in val.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = item.split_once('=').and_then(|(format, path)| {
            let format = match format.trim().to_lowercase().as_str() {
                "access" => SourceKind::Access,
                "auth" => SourceKind::Auth,
                _ => return None,
            };
            Some(SourceConfig {
                path: path.trim().to_owned(),
                format,
            })
        });

        match parsed {
            Some(source) => sources.push(source),
            None => {
                warn!(
                    env_key,
                    item, "invalid source entry in env var (expected format=path), ignoring"
                );
                return;
            }
        }
    }
    *target = sources;
}
