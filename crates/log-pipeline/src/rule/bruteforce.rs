//! 무차별 대입(bruteforce) 탐지기
//!
//! 같은 사용자명에 대한 로그인 실패가 윈도우 안에서 임계값 이상 쌓이면
//! 알림을 생성합니다.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use authwatch_core::config::BruteforceConfig;
use authwatch_core::pipeline::Detector;
use authwatch_core::types::{Alert, AlertKind, LoginEvent, Outcome};

use super::window::{AttemptWindow, CooldownMap};

/// 무차별 대입 탐지기
///
/// 키: 사용자명. 실패 결과(`Outcome::Failure`)인 이벤트만 셉니다.
pub struct BruteforceDetector {
    threshold: u32,
    reset_on_alert: bool,
    attempts: AttemptWindow<()>,
    cooldowns: CooldownMap,
}

impl BruteforceDetector {
    /// 설정으로 탐지기를 생성합니다.
    pub fn new(config: &BruteforceConfig) -> Self {
        Self {
            threshold: config.threshold.max(1),
            reset_on_alert: config.reset_on_alert,
            attempts: AttemptWindow::new(std::time::Duration::from_secs(config.window_secs)),
            cooldowns: CooldownMap::new(std::time::Duration::from_secs(config.cooldown_secs)),
        }
    }
}

impl Default for BruteforceDetector {
    fn default() -> Self {
        Self::new(&BruteforceConfig::default())
    }
}

impl Detector for BruteforceDetector {
    fn name(&self) -> &str {
        "bruteforce"
    }

    fn check(&mut self, event: &LoginEvent, now: DateTime<Utc>) -> Option<Alert> {
        if event.outcome() != Some(Outcome::Failure) {
            return None;
        }
        let username = event.username();
        if username.is_empty() {
            return None;
        }

        let count = self.attempts.record(username, now, ()).len();
        if count < self.threshold as usize {
            return None;
        }

        if self.cooldowns.is_cooling(username, now) {
            trace!(username, count, "bruteforce alert suppressed by cooldown");
            return None;
        }

        self.cooldowns.mark(username, now);
        if self.reset_on_alert {
            self.attempts.clear(username);
        }

        debug!(username, count, "bruteforce threshold reached");
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        Some(
            Alert::from_event(AlertKind::Bruteforce, event)
                .with_count(count)
                .with_outcome(Some(Outcome::Failure)),
        )
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.attempts.sweep(now) + self.cooldowns.sweep(now)
    }

    fn tracked_keys(&self) -> usize {
        self.attempts.len() + self.cooldowns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authwatch_core::types::AuthLogin;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn login(username: &str, status: &str) -> LoginEvent {
        LoginEvent::Auth(AuthLogin {
            time_local: "19/Oct/2026:12:00:00".to_owned(),
            timestamp: t0(),
            level: "WARNING".to_owned(),
            status: status.to_owned(),
            username: username.to_owned(),
            password: Some("guess".to_owned()),
        })
    }

    fn feed(detector: &mut BruteforceDetector, user: &str, n: usize, start: DateTime<Utc>) -> Vec<Alert> {
        (0..n)
            .filter_map(|i| {
                detector.check(&login(user, "failure"), start + TimeDelta::seconds(i as i64))
            })
            .collect()
    }

    #[test]
    fn alerts_exactly_once_at_threshold() {
        let mut detector = BruteforceDetector::default();
        let alerts = feed(&mut detector, "alice", 5, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Bruteforce);
        assert_eq!(alerts[0].count, Some(5));
        assert_eq!(alerts[0].username.as_deref(), Some("alice"));
    }

    #[test]
    fn below_threshold_is_silent() {
        let mut detector = BruteforceDetector::default();
        assert!(feed(&mut detector, "alice", 4, t0()).is_empty());
    }

    #[test]
    fn successful_and_unknown_outcomes_are_ignored() {
        let mut detector = BruteforceDetector::default();
        for i in 0..10 {
            let now = t0() + TimeDelta::seconds(i);
            assert!(detector.check(&login("alice", "success"), now).is_none());
            assert!(detector.check(&login("alice", "pending"), now).is_none());
        }
        assert_eq!(detector.tracked_keys(), 0);
    }

    #[test]
    fn empty_username_is_ignored() {
        let mut detector = BruteforceDetector::default();
        assert!(feed(&mut detector, "", 10, t0()).is_empty());
        assert_eq!(detector.tracked_keys(), 0);
    }

    #[test]
    fn stale_attempts_do_not_count() {
        let mut detector = BruteforceDetector::default();
        // 4번 실패 후 윈도우를 넘겨 1번 더 실패
        assert!(feed(&mut detector, "alice", 4, t0()).is_empty());
        let late = t0() + TimeDelta::seconds(120);
        assert!(detector.check(&login("alice", "failure"), late).is_none());
    }

    #[test]
    fn cooldown_suppresses_then_rearms() {
        let config = BruteforceConfig {
            reset_on_alert: false,
            ..BruteforceConfig::default()
        };
        let mut detector = BruteforceDetector::new(&config);

        assert_eq!(feed(&mut detector, "alice", 5, t0()).len(), 1);
        // 쿨다운 중에는 계속 실패해도 알림 없음
        assert!(feed(&mut detector, "alice", 5, t0() + TimeDelta::seconds(10)).is_empty());

        // 쿨다운(60초) 이후 다시 임계값 도달
        let alerts = feed(&mut detector, "alice", 5, t0() + TimeDelta::seconds(70));
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn reset_on_alert_requires_full_reaccumulation() {
        let mut detector = BruteforceDetector::default();
        assert_eq!(feed(&mut detector, "alice", 5, t0()).len(), 1);

        // 쿨다운 이후 한 번 실패만으로는 알림 없음
        let later = t0() + TimeDelta::seconds(65);
        assert!(detector.check(&login("alice", "failure"), later).is_none());
    }

    #[test]
    fn users_are_tracked_independently() {
        let mut detector = BruteforceDetector::default();
        assert!(feed(&mut detector, "alice", 3, t0()).is_empty());
        assert!(feed(&mut detector, "bob", 3, t0()).is_empty());
        assert_eq!(detector.tracked_keys(), 2);
    }

    #[test]
    fn sweep_releases_memory() {
        let mut detector = BruteforceDetector::default();
        feed(&mut detector, "alice", 5, t0());
        feed(&mut detector, "bob", 2, t0());
        assert!(detector.tracked_keys() > 0);

        let removed = detector.sweep(t0() + TimeDelta::seconds(600));
        assert!(removed >= 2);
        assert_eq!(detector.tracked_keys(), 0);
    }
}
