//! 윈도우 카운터 유틸리티 -- 탐지기들이 공유하는 상태 자료구조
//!
//! - [`AttemptWindow`]: 키별 슬라이딩 윈도우 (시각 오름차순 `VecDeque`)
//! - [`CooldownMap`]: 키별 마지막 알림 시각
//!
//! 두 구조체 모두 `sweep`으로 만료된 키를 제거하여 메모리를 제한합니다.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// `std::time::Duration`을 chrono 간격으로 변환합니다. 범위를 넘으면 최대값.
pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// `last`에 알림을 낸 키가 `now`에도 쿨다운 중인지. 쿨다운 0은 억제하지 않습니다.
fn cooling(last: DateTime<Utc>, now: DateTime<Utc>, cooldown: TimeDelta) -> bool {
    !cooldown.is_zero() && now.signed_duration_since(last) <= cooldown
}

/// 키별 슬라이딩 윈도우
///
/// 각 키의 시도는 기록 순서(= 시각 오름차순)로 저장되므로 만료 검사는
/// 앞쪽에서만 수행하면 됩니다. `T`는 시도마다 함께 저장할 태그입니다
/// (예: 스프레이 탐지의 사용자명).
#[derive(Debug)]
pub struct AttemptWindow<T> {
    window: TimeDelta,
    attempts: HashMap<String, VecDeque<(DateTime<Utc>, T)>>,
}

impl<T> AttemptWindow<T> {
    /// 새 윈도우를 생성합니다.
    pub fn new(window: Duration) -> Self {
        Self {
            window: to_delta(window),
            attempts: HashMap::new(),
        }
    }

    /// 시도를 기록하고 만료된 항목을 제거한 뒤 해당 키의 현재 시도 목록을 반환합니다.
    ///
    /// 벽시계가 뒤로 가서 `at`이 마지막 기록보다 이르면 마지막 기록 시각으로
    /// 맞춥니다. 이렇게 하면 deque의 오름차순이 유지됩니다.
    pub fn record(&mut self, key: &str, at: DateTime<Utc>, tag: T) -> &VecDeque<(DateTime<Utc>, T)> {
        let window = self.window;
        let entries = self.attempts.entry(key.to_owned()).or_default();

        let at = match entries.back() {
            Some((last, _)) if *last > at => *last,
            _ => at,
        };
        entries.push_back((at, tag));
        evict(entries, at, window);
        entries
    }

    /// 키의 현재 시도 수 (만료 검사 없이)
    pub fn count(&self, key: &str) -> usize {
        self.attempts.get(key).map_or(0, VecDeque::len)
    }

    /// 키의 모든 시도를 지웁니다.
    pub fn clear(&mut self, key: &str) {
        self.attempts.remove(key);
    }

    /// 모든 키에서 만료된 시도를 제거하고, 비게 된 키를 삭제합니다.
    ///
    /// 삭제된 키 수를 반환합니다.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let before = self.attempts.len();
        self.attempts.retain(|_, entries| {
            evict(entries, now, window);
            !entries.is_empty()
        });
        before - self.attempts.len()
    }

    /// 추적 중인 키 수
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// 추적 중인 키가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

fn evict<T>(entries: &mut VecDeque<(DateTime<Utc>, T)>, now: DateTime<Utc>, window: TimeDelta) {
    while let Some((at, _)) = entries.front() {
        if now.signed_duration_since(*at) > window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

/// 키별 재알림 금지 기간 추적
#[derive(Debug)]
pub struct CooldownMap {
    cooldown: TimeDelta,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl CooldownMap {
    /// 새 쿨다운 맵을 생성합니다. 쿨다운이 0이면 억제하지 않습니다.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: to_delta(cooldown),
            last_alert: HashMap::new(),
        }
    }

    /// `now` 시점에 키가 아직 쿨다운 중인지 확인합니다.
    ///
    /// 마지막 알림으로부터 정확히 쿨다운만큼 지난 시점까지는 쿨다운 중입니다.
    pub fn is_cooling(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.last_alert
            .get(key)
            .is_some_and(|last| cooling(*last, now, self.cooldown))
    }

    /// 키에 대한 알림 시각을 기록합니다.
    pub fn mark(&mut self, key: &str, now: DateTime<Utc>) {
        self.last_alert.insert(key.to_owned(), now);
    }

    /// 쿨다운이 끝난 키를 제거하고 제거한 수를 반환합니다.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let cooldown = self.cooldown;
        let before = self.last_alert.len();
        self.last_alert.retain(|_, last| cooling(*last, now, cooldown));
        before - self.last_alert.len()
    }

    /// 추적 중인 키 수
    pub fn len(&self) -> usize {
        self.last_alert.len()
    }

    /// 추적 중인 키가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.last_alert.is_empty()
    }
}
