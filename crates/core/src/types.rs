//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 외부 파서가 만든 [`LoginEvent`]와 탐지 결과인 [`Alert`]를 정의합니다.
//! 각 모듈은 이 타입들을 사용하여 이벤트와 알림을 교환합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 로그인 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// 로그인 성공
    Success,
    /// 로그인 실패
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// 로그인 이벤트의 출처 로그 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// 리버스 프록시 access 로그
    Access,
    /// 애플리케이션 인증 로그
    Auth,
}

impl SourceKind {
    /// 파서 형식 이름 및 메트릭 레이블
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Auth => "auth",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 리버스 프록시 access 로그에서 추출한 요청
///
/// 로그인 요청이 아닐 수도 있습니다. [`LoginEvent::is_login`]으로 판별합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogin {
    /// 원본 시각 문자열
    pub time_local: String,
    /// 파싱된 시각 (파싱 불가 시 수신 시각)
    pub timestamp: DateTime<Utc>,
    /// 클라이언트 주소
    pub source_addr: String,
    /// 요청 라인 (예: "POST /login HTTP/1.1")
    pub request: String,
    /// HTTP 상태 코드 문자열
    pub status: String,
    /// 요청 본문의 사용자명
    pub username: String,
    /// 요청 본문의 비밀번호
    pub password: Option<String>,
}

/// 애플리케이션 인증 로그의 로그인 시도
///
/// 이 로그에는 클라이언트 주소가 없습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLogin {
    /// 원본 시각 문자열
    pub time_local: String,
    /// 파싱된 시각 (파싱 불가 시 수신 시각)
    pub timestamp: DateTime<Utc>,
    /// 로그 레벨
    pub level: String,
    /// 인증 상태 (success, failure, error ...)
    pub status: String,
    /// 사용자명
    pub username: String,
    /// 비밀번호
    pub password: Option<String>,
}

/// 파싱된 로그인 이벤트
///
/// 두 로그 소스의 이벤트를 하나의 타입으로 다룹니다. 소스마다 제공하는
/// 필드가 다르므로, 선택 필드는 `Option`으로 노출합니다. 탐지기는 필요한
/// 필드가 없으면 해당 이벤트를 건너뜁니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum LoginEvent {
    /// access 로그 이벤트
    Access(AccessLogin),
    /// 인증 로그 이벤트
    Auth(AuthLogin),
}

impl LoginEvent {
    /// 로그인 시도인지 확인합니다.
    ///
    /// access 로그는 `POST .../login` 요청만 로그인으로 취급합니다.
    /// 인증 로그의 모든 레코드는 로그인 시도입니다.
    pub fn is_login(&self) -> bool {
        match self {
            Self::Access(a) => a.request.starts_with("POST") && a.request.contains("/login"),
            Self::Auth(_) => true,
        }
    }

    /// 사용자명
    pub fn username(&self) -> &str {
        match self {
            Self::Access(a) => &a.username,
            Self::Auth(a) => &a.username,
        }
    }

    /// 비밀번호 (있을 경우)
    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Access(a) => a.password.as_deref(),
            Self::Auth(a) => a.password.as_deref(),
        }
    }

    /// 원본 시각 문자열
    pub fn time_local(&self) -> &str {
        match self {
            Self::Access(a) => &a.time_local,
            Self::Auth(a) => &a.time_local,
        }
    }

    /// 이벤트 시각
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Access(a) => a.timestamp,
            Self::Auth(a) => a.timestamp,
        }
    }

    /// 클라이언트 주소 (access 로그만 제공)
    pub fn source_addr(&self) -> Option<&str> {
        match self {
            Self::Access(a) if !a.source_addr.is_empty() => Some(&a.source_addr),
            _ => None,
        }
    }

    /// 이벤트 출처
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Access(_) => SourceKind::Access,
            Self::Auth(_) => SourceKind::Auth,
        }
    }

    /// 로그인 결과를 판별합니다. 판별할 수 없으면 `None`.
    ///
    /// access 로그는 HTTP 상태로 판단합니다. 로그인 성공 시 리다이렉트(302/303),
    /// 실패 시 로그인 폼을 다시 렌더링(200)하거나 401/403을 돌려줍니다.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Access(a) => match a.status.as_str() {
                "302" | "303" => Some(Outcome::Success),
                "200" | "401" | "403" => Some(Outcome::Failure),
                _ => None,
            },
            Self::Auth(a) => match a.status.to_lowercase().as_str() {
                "success" | "ok" => Some(Outcome::Success),
                "failure" | "fail" | "failed" | "error" => Some(Outcome::Failure),
                _ => None,
            },
        }
    }
}

impl fmt::Display for LoginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} user={} from={}",
            self.source_kind(),
            self.time_local(),
            self.username(),
            self.source_addr().unwrap_or("-"),
        )
    }
}

/// 알림 종류
///
/// 직렬화 시 싱크 테이블의 `type` 컬럼 값과 동일한 문자열을 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// 로그인 관측 (감사용)
    #[serde(rename = "alert_login")]
    Login,
    /// 무차별 대입
    #[serde(rename = "bruteforce")]
    Bruteforce,
    /// 패스워드 스프레이
    #[serde(rename = "password_spraying")]
    PasswordSpraying,
    /// SQL 인젝션 시도
    #[serde(rename = "sql_injection")]
    SqlInjection,
}

impl AlertKind {
    /// 싱크와 메트릭 레이블에 쓰는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "alert_login",
            Self::Bruteforce => "bruteforce",
            Self::PasswordSpraying => "password_spraying",
            Self::SqlInjection => "sql_injection",
        }
    }

    /// 종류별 기본 심각도
    pub fn severity(&self) -> Severity {
        match self {
            Self::Login => Severity::Info,
            Self::Bruteforce | Self::PasswordSpraying => Severity::High,
            Self::SqlInjection => Severity::Critical,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 보안 알림
///
/// 탐지기가 생성하여 싱크로 넘깁니다. 싱크에 넘긴 뒤에는 코어가 추적하지 않습니다.
/// 규칙에 해당하지 않는 선택 필드는 직렬화에서 생략됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID
    pub id: String,
    /// 알림 종류
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// 심각도
    pub severity: Severity,
    /// 이벤트 시각
    pub timestamp: DateTime<Utc>,
    /// 원본 시각 문자열
    pub time_local: String,
    /// 관련 클라이언트 주소
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_addr: Option<String>,
    /// 동작 (현재는 항상 "login")
    pub action: String,
    /// 관련 사용자명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// 관련 비밀번호
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// 로그인 결과
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// 임계값 규칙의 카운트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// 스프레이에 사용된 공통 비밀번호
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_password: Option<String>,
    /// 싱크 기록 시각. 디스패처가 단조 증가하도록 찍습니다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// 이벤트를 기준으로 새 알림을 만듭니다.
    ///
    /// 시각, 주소, 사용자명은 이벤트에서 채우고 나머지 선택 필드는 비워 둡니다.
    pub fn from_event(kind: AlertKind, event: &LoginEvent) -> Self {
        let username = event.username();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity: kind.severity(),
            timestamp: event.timestamp(),
            time_local: event.time_local().to_owned(),
            source_addr: event.source_addr().map(str::to_owned),
            action: "login".to_owned(),
            username: (!username.is_empty()).then(|| username.to_owned()),
            password: None,
            outcome: None,
            count: None,
            common_password: None,
            recorded_at: None,
        }
    }

    /// 카운트를 설정합니다.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// 로그인 결과를 설정합니다.
    pub fn with_outcome(mut self, outcome: Option<Outcome>) -> Self {
        self.outcome = outcome;
        self
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} user={} from={}",
            self.severity,
            self.kind,
            self.username.as_deref().unwrap_or("-"),
            self.source_addr.as_deref().unwrap_or("-"),
        )?;
        if let Some(count) = self.count {
            write!(f, " count={count}")?;
        }
        Ok(())
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}
