//! SQL 인젝션 시도 탐지기
//!
//! 사용자명과 비밀번호에 SQL 메타 문자열이 들어 있는지 검사합니다.
//! 카운팅 윈도우는 없고, 같은 키에 대한 반복 알림만 쿨다운으로 억제합니다.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use authwatch_core::config::{DedupKey, SqlInjectionConfig};
use authwatch_core::pipeline::Detector;
use authwatch_core::types::{Alert, AlertKind, LoginEvent};

use super::window::CooldownMap;

/// 기본 시그니처 (대문자, 부분 문자열 매칭)
///
/// 앞뒤 공백이 있는 항목은 일반 단어와 구분하기 위한 것입니다.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    "' OR '1'='1",
    "' OR 1=1 --",
    "\" OR \"\"=\"",
    " UNION SELECT ",
    " UNION ALL SELECT ",
    "; DROP TABLE ",
    "; SELECT ",
    " OR 1=1",
    " AND 1=1",
    " EXEC ",
    " EXECUTE ",
    " DECLARE ",
    " WAITFOR DELAY ",
    " XP_",
    "/*",
    "*/",
    "--",
    ";",
];

/// SQL 인젝션 탐지기
pub struct SqlInjectionDetector {
    signatures: Vec<String>,
    dedup_key: DedupKey,
    cooldowns: CooldownMap,
}

impl SqlInjectionDetector {
    /// 설정으로 탐지기를 생성합니다. 추가 시그니처는 대문자로 정규화됩니다.
    pub fn new(config: &SqlInjectionConfig) -> Self {
        let mut signatures: Vec<String> =
            DEFAULT_SIGNATURES.iter().map(|s| (*s).to_owned()).collect();
        for extra in &config.extra_signatures {
            let extra = extra.to_uppercase();
            if !extra.is_empty() && !signatures.contains(&extra) {
                signatures.push(extra);
            }
        }

        Self {
            signatures,
            dedup_key: config.dedup_key,
            cooldowns: CooldownMap::new(Duration::from_secs(config.cooldown_secs)),
        }
    }

    /// 입력에서 처음 일치하는 시그니처를 찾습니다. 대소문자를 구분하지 않습니다.
    pub fn find_signature(&self, input: &str) -> Option<&str> {
        if input.is_empty() {
            return None;
        }
        let upper = input.to_uppercase();
        self.signatures
            .iter()
            .find(|sig| upper.contains(sig.as_str()))
            .map(String::as_str)
    }

    fn key_for<'a>(&self, event: &'a LoginEvent) -> &'a str {
        match self.dedup_key {
            DedupKey::Auto | DedupKey::SourceAddr => {
                event.source_addr().unwrap_or_else(|| event.username())
            }
            DedupKey::Username => event.username(),
        }
    }
}

impl Default for SqlInjectionDetector {
    fn default() -> Self {
        Self::new(&SqlInjectionConfig::default())
    }
}

impl Detector for SqlInjectionDetector {
    fn name(&self) -> &str {
        "sql_injection"
    }

    fn check(&mut self, event: &LoginEvent, now: DateTime<Utc>) -> Option<Alert> {
        let signature = self
            .find_signature(event.username())
            .or_else(|| event.password().and_then(|p| self.find_signature(p)))?
            .to_owned();

        let key = self.key_for(event);
        if self.cooldowns.is_cooling(key, now) {
            trace!(key, "sql injection alert suppressed by cooldown");
            return None;
        }
        self.cooldowns.mark(key, now);

        debug!(key, signature = signature.as_str(), "sql injection signature matched");
        Some(Alert::from_event(AlertKind::SqlInjection, event).with_outcome(event.outcome()))
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.cooldowns.sweep(now)
    }

    fn tracked_keys(&self) -> usize {
        self.cooldowns.len()
    }
}
