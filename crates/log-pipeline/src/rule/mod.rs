//! 탐지 규칙 -- 상태를 가진 공격 패턴 탐지기
//!
//! 모든 탐지기는 core의 [`Detector`](authwatch_core::pipeline::Detector) trait을 구현합니다.
//!
//! | 규칙 | 키 | 조건 | 기본값 |
//! |---|---|---|---|
//! | [`BruteforceDetector`] | 사용자명 | 윈도우 내 실패 N회 이상 | 5회 / 60초, 쿨다운 60초 |
//! | [`PasswordSprayDetector`] | 비밀번호 | 윈도우 내 서로 다른 사용자 M명 이상 | 2명 / 60초, 쿨다운 60초 |
//! | [`SqlInjectionDetector`] | 주소 또는 사용자명 | 시그니처 포함 | 쿨다운 5초 |
//!
//! # 아키텍처
//! - [`window`]: 키별 슬라이딩 윈도우와 쿨다운 맵 (탐지기 공용)
//! - 각 탐지기는 자기 맵만 소유하며 키 공간을 공유하지 않습니다.

pub mod bruteforce;
pub mod spray;
pub mod sql_injection;
pub mod window;

pub use bruteforce::BruteforceDetector;
pub use spray::PasswordSprayDetector;
pub use sql_injection::{DEFAULT_SIGNATURES, SqlInjectionDetector};
pub use window::{AttemptWindow, CooldownMap};

use authwatch_core::config::DetectionConfig;
use authwatch_core::pipeline::Detector;

/// 설정에서 활성화된 탐지기를 평가 순서대로 생성합니다.
///
/// 순서: SQL 인젝션 -> 무차별 대입 -> 패스워드 스프레이.
/// 비활성화된 규칙은 생성하지 않습니다.
pub fn build_detectors(config: &DetectionConfig) -> Vec<Box<dyn Detector>> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::with_capacity(3);
    if config.sql_injection.enabled {
        detectors.push(Box::new(SqlInjectionDetector::new(&config.sql_injection)));
    }
    if config.bruteforce.enabled {
        detectors.push(Box::new(BruteforceDetector::new(&config.bruteforce)));
    }
    if config.password_spray.enabled {
        detectors.push(Box::new(PasswordSprayDetector::new(&config.password_spray)));
    }
    detectors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_all_detectors_in_order() {
        let detectors = build_detectors(&DetectionConfig::default());
        let names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["sql_injection", "bruteforce", "password_spray"]);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let mut config = DetectionConfig::default();
        config.bruteforce.enabled = false;
        config.sql_injection.enabled = false;
        let detectors = build_detectors(&config);
        assert_eq!(detectors.len(), 1);
        assert_eq!(detectors[0].name(), "password_spray");
    }
}
