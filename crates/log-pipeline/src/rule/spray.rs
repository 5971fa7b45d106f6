//! 패스워드 스프레이 탐지기
//!
//! 같은 비밀번호로 여러 계정에 로그인을 시도하는 패턴을 탐지합니다.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use authwatch_core::config::PasswordSprayConfig;
use authwatch_core::pipeline::Detector;
use authwatch_core::types::{Alert, AlertKind, LoginEvent, Outcome};

use super::window::{AttemptWindow, CooldownMap};

/// 패스워드 스프레이 탐지기
///
/// 키: 비밀번호. 윈도우 안에서 서로 다른 사용자명 수가 임계값 이상이면 알립니다.
pub struct PasswordSprayDetector {
    distinct_users: u32,
    reset_on_alert: bool,
    attempts: AttemptWindow<String>,
    cooldowns: CooldownMap,
}

impl PasswordSprayDetector {
    /// 설정으로 탐지기를 생성합니다.
    pub fn new(config: &PasswordSprayConfig) -> Self {
        Self {
            distinct_users: config.distinct_users.max(1),
            reset_on_alert: config.reset_on_alert,
            attempts: AttemptWindow::new(Duration::from_secs(config.window_secs)),
            cooldowns: CooldownMap::new(Duration::from_secs(config.cooldown_secs)),
        }
    }
}

impl Default for PasswordSprayDetector {
    fn default() -> Self {
        Self::new(&PasswordSprayConfig::default())
    }
}

impl Detector for PasswordSprayDetector {
    fn name(&self) -> &str {
        "password_spray"
    }

    fn check(&mut self, event: &LoginEvent, now: DateTime<Utc>) -> Option<Alert> {
        if event.outcome() != Some(Outcome::Failure) {
            return None;
        }
        let password = event.password().filter(|p| !p.is_empty())?;

        let entries = self
            .attempts
            .record(password, now, event.username().to_owned());
        let distinct = entries
            .iter()
            .map(|(_, user)| user.as_str())
            .collect::<HashSet<_>>()
            .len();

        if distinct < self.distinct_users as usize {
            return None;
        }

        if self.cooldowns.is_cooling(password, now) {
            trace!(distinct, "password spray alert suppressed by cooldown");
            return None;
        }

        self.cooldowns.mark(password, now);
        if self.reset_on_alert {
            self.attempts.clear(password);
        }

        debug!(distinct, "password spray threshold reached");
        let mut alert = Alert::from_event(AlertKind::PasswordSpraying, event)
            .with_count(u32::try_from(distinct).unwrap_or(u32::MAX))
            .with_outcome(Some(Outcome::Failure));
        alert.common_password = Some(password.to_owned());
        Some(alert)
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.attempts.sweep(now) + self.cooldowns.sweep(now)
    }

    fn tracked_keys(&self) -> usize {
        self.attempts.len() + self.cooldowns.len()
    }
}
