//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`AuthwatchConfig`]에서 파이프라인이 쓰는
//! 섹션(`tailer`, `detection`, `sink`)만 모은 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use authwatch_core::config::AuthwatchConfig;
//! use authwatch_log_pipeline::config::PipelineConfig;
//!
//! let core_config = AuthwatchConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use authwatch_core::config::{
    AuthwatchConfig, DetectionConfig, SinkConfig, SourceConfig, StartPosition, TailerConfig,
};
use authwatch_core::types::SourceKind;

use crate::error::LogPipelineError;

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 파일 테일러 설정
    pub tailer: TailerConfig,
    /// 탐지 규칙 설정
    pub detection: DetectionConfig,
    /// 알림 싱크 설정
    pub sink: SinkConfig,
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &AuthwatchConfig) -> Self {
        Self {
            tailer: core.tailer.clone(),
            detection: core.detection.clone(),
            sink: core.sink.clone(),
        }
    }

    /// 감시 경로가 사용할 수 있는 형태인지 검증합니다.
    ///
    /// # 검증 규칙
    /// - 비어 있지 않아야 함
    /// - ".." 컴포넌트를 포함하지 않아야 함
    /// - 파일 이름이 있어야 함 (디렉토리 경로 불가)
    fn validate_source_path(path_str: &str) -> Result<(), LogPipelineError> {
        if path_str.trim().is_empty() {
            return Err(LogPipelineError::Config {
                field: "tailer.sources".to_owned(),
                reason: "source path must not be empty".to_owned(),
            });
        }

        let path = Path::new(path_str);

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(LogPipelineError::Config {
                field: "tailer.sources".to_owned(),
                reason: format!("source path '{path_str}' contains path traversal pattern '..'"),
            });
        }

        if path.file_name().is_none() || path_str.ends_with('/') {
            return Err(LogPipelineError::Config {
                field: "tailer.sources".to_owned(),
                reason: format!("source path '{path_str}' must name a file"),
            });
        }

        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        self.tailer.validate().map_err(config_error)?;
        self.detection.validate().map_err(config_error)?;
        self.sink.validate().map_err(config_error)?;

        if self.tailer.sources.is_empty() {
            return Err(LogPipelineError::Config {
                field: "tailer.sources".to_owned(),
                reason: "at least one source must be configured".to_owned(),
            });
        }

        for source in &self.tailer.sources {
            Self::validate_source_path(&source.path)?;
        }

        Ok(())
    }
}

fn config_error(err: authwatch_core::error::AuthwatchError) -> LogPipelineError {
    match err {
        authwatch_core::error::AuthwatchError::Config(
            authwatch_core::error::ConfigError::InvalidValue { field, reason },
        ) => LogPipelineError::Config { field, reason },
        other => LogPipelineError::Config {
            field: "config".to_owned(),
            reason: other.to_string(),
        },
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 감시 소스 목록을 교체합니다.
    pub fn sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.config.tailer.sources = sources;
        self
    }

    /// 감시 소스를 하나 추가합니다.
    pub fn source(mut self, path: impl Into<String>, format: SourceKind) -> Self {
        self.config.tailer.sources.push(SourceConfig {
            path: path.into(),
            format,
        });
        self
    }

    /// 시작 위치를 설정합니다.
    pub fn start_position(mut self, position: StartPosition) -> Self {
        self.config.tailer.start_position = position;
        self
    }

    /// 폴링 주기(초)를 설정합니다.
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.tailer.poll_interval_secs = secs;
        self
    }

    /// 테일러 설정 전체를 교체합니다.
    pub fn tailer(mut self, tailer: TailerConfig) -> Self {
        self.config.tailer = tailer;
        self
    }

    /// 탐지 설정을 교체합니다.
    pub fn detection(mut self, detection: DetectionConfig) -> Self {
        self.config.detection = detection;
        self
    }

    /// 싱크 설정을 교체합니다.
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.config.sink = sink;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_copies_sections() {
        let mut core = AuthwatchConfig::default();
        core.tailer.poll_interval_secs = 9;
        core.detection.bruteforce.threshold = 3;
        core.sink.queue_capacity = 16;

        let config = PipelineConfig::from_core(&core);
        assert_eq!(config.tailer.poll_interval_secs, 9);
        assert_eq!(config.detection.bruteforce.threshold, 3);
        assert_eq!(config.sink.queue_capacity, 16);
    }

    #[test]
    fn validate_rejects_empty_sources() {
        let result = PipelineConfigBuilder::new().sources(Vec::new()).build();
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_traversal() {
        let result = PipelineConfigBuilder::new()
            .sources(Vec::new())
            .source("/var/log/../etc/shadow", SourceKind::Auth)
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn validate_rejects_directory_path() {
        let result = PipelineConfigBuilder::new()
            .sources(Vec::new())
            .source("/var/log/", SourceKind::Access)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn core_validation_errors_keep_field_name() {
        let mut detection = DetectionConfig::default();
        detection.bruteforce.window_secs = 0;
        let err = PipelineConfigBuilder::new().detection(detection).build().unwrap_err();
        assert!(err.to_string().contains("detection.bruteforce.window_secs"));
    }

    #[test]
    fn builder_sets_tailer_options() {
        let config = PipelineConfigBuilder::new()
            .sources(Vec::new())
            .source("/tmp/auth.log", SourceKind::Auth)
            .start_position(StartPosition::Beginning)
            .poll_interval_secs(1)
            .build()
            .unwrap();
        assert_eq!(config.tailer.sources.len(), 1);
        assert_eq!(config.tailer.start_position, StartPosition::Beginning);
        assert_eq!(config.tailer.poll_interval_secs, 1);
    }
}
