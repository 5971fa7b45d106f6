//! append-only JSON lines 알림 싱크
//!
//! 알림 하나를 JSON 한 줄로 파일 끝에 추가합니다. 디스패처가 찍은
//! `recorded_at`은 단조 증가하므로, 외부 알림 전송기는 마지막으로 본
//! `recorded_at`을 워터마크로 삼아 [`JsonLinesSink::read_since`]로 새 알림만
//! 가져갈 수 있습니다.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use authwatch_core::error::SinkError;
use authwatch_core::pipeline::{AlertSink, BoxFuture};
use authwatch_core::types::Alert;

use crate::error::LogPipelineError;

/// JSON lines 파일 싱크
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// 파일을 append 모드로 엽니다. 부모 디렉토리가 없으면 만듭니다.
    ///
    /// 시작 시점에 호출되며, 실패는 설정 에러로 취급합니다.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogPipelineError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LogPipelineError::Config {
                field: "sink.path".to_owned(),
                reason: format!("cannot create directory '{}': {e}", parent.display()),
            })?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogPipelineError::Config {
                field: "sink.path".to_owned(),
                reason: format!("cannot open '{}': {e}", path.display()),
            })?;

        debug!(path = %path.display(), "opened alert file");
        Ok(Self {
            path,
            file: Mutex::new(File::from_std(file)),
        })
    }

    /// 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `recorded_at`이 `watermark`보다 뒤인 알림을 오름차순으로 반환합니다.
    ///
    /// `None`이면 전부 반환합니다. 읽을 수 없는 줄은 경고 후 건너뜁니다.
    pub async fn read_since(&self, watermark: Option<DateTime<Utc>>) -> Result<Vec<Alert>, SinkError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SinkError::Unavailable(format!("{}: {e}", self.path.display())))?;

        let mut alerts: Vec<Alert> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(idx, line)| match serde_json::from_str::<Alert>(line) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(path = %self.path.display(), line = idx + 1, error = %e, "skipping unreadable alert record");
                    None
                }
            })
            .filter(|alert| match (watermark, alert.recorded_at) {
                (None, _) => true,
                (Some(mark), Some(at)) => at > mark,
                (Some(_), None) => false,
            })
            .collect();

        alerts.sort_by_key(|a| a.recorded_at);
        Ok(alerts)
    }
}

impl AlertSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn record<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(alert).map_err(|e| SinkError::Serialize(e.to_string()))?;
            line.push(b'\n');

            // 한 줄은 락을 쥔 채로 씁니다
            let mut file = self.file.lock().await;
            file.write_all(&line)
                .await
                .map_err(|e| SinkError::Write(e.to_string()))?;
            file.flush().await.map_err(|e| SinkError::Write(e.to_string()))
        })
    }
}
