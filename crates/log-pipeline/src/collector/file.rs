//! 파일 테일러
//!
//! 로그 파일 하나를 감시하며 새로 추가된 완전한 라인만 읽습니다.
//! `tail -F`와 유사한 동작을 비동기 방식으로 구현합니다.
//!
//! # 트리거
//! - 변경 알림 (`notify`, 부모 디렉토리를 비재귀로 감시)
//! - 폴링 타이머 (알림을 놓치거나 감시기를 만들 수 없을 때 대비)
//!
//! 두 트리거 모두 같은 읽기 경로를 거치므로, 같은 변경에 대해 여러 번
//! 깨어나도 결과는 같습니다. 오프셋은 핸들러가 받아들인 라인까지만 반영합니다.
//!
//! # 로테이션 감지
//! - 파일 크기 축소 (truncation)
//! - 파일 식별자 변경 (Unix에서 dev/inode, logrotate의 rename + create)
//!
//! 둘 중 하나라도 감지되면 오프셋 0부터 다시 읽습니다.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use authwatch_core::config::{StartPosition, TailerConfig};
use authwatch_core::metrics as m;
use authwatch_core::types::SourceKind;

use super::RawLog;
use crate::error::LogPipelineError;

/// 한 번의 read 호출로 읽을 바이트 수
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// 테일러 동작 옵션
#[derive(Debug, Clone)]
pub struct TailerOptions {
    /// 폴링 주기
    pub poll_interval: Duration,
    /// stat/open/seek/read 각각의 타임아웃
    pub io_timeout: Duration,
    /// 최대 라인 길이 (바이트). 초과 라인은 버립니다.
    pub max_line_length: usize,
    /// 한 번의 폴링에서 넘길 최대 라인 수. 남은 데이터는 곧바로 이어서 읽습니다.
    pub max_lines_per_poll: usize,
    /// 처음 열 때의 시작 위치
    pub start_position: StartPosition,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self::from_config(&TailerConfig::default())
    }
}

impl TailerOptions {
    /// core 설정에서 옵션을 생성합니다.
    pub fn from_config(config: &TailerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            io_timeout: config.io_timeout(),
            max_line_length: config.max_line_length,
            max_lines_per_poll: 1000,
            start_position: config.start_position,
        }
    }
}

/// 파일 식별자 (Unix: 장치 번호 + inode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    /// 메타데이터에서 식별자를 추출합니다. Unix가 아니면 `None`.
    #[cfg(unix)]
    fn of(meta: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_meta: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// 테일러 위치 상태
///
/// 메모리에만 유지됩니다. 테일러를 다시 만들 때 [`FileTailer::resume`]에
/// 넘기면 이어서 읽습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailState {
    /// 파일 경로
    pub path: PathBuf,
    /// 다음에 읽을 바이트 오프셋 (마지막 완전한 라인 다음)
    pub offset: u64,
    /// 마지막으로 관측한 수정 시각
    pub last_modified: Option<SystemTime>,
    /// 마지막으로 관측한 파일 식별자
    pub file_id: Option<FileId>,
}

impl TailState {
    /// 오프셋 0의 새 상태를 생성합니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            last_modified: None,
            file_id: None,
        }
    }
}

/// 테일러가 읽은 라인을 받는 쪽
///
/// `false`를 반환하면 받는 쪽이 닫힌 것으로 보고 테일러를 멈춥니다.
pub trait LineHandler: Send {
    /// 라인 하나를 처리합니다.
    fn handle(&mut self, line: RawLog) -> impl Future<Output = bool> + Send;
}

impl LineHandler for mpsc::Sender<RawLog> {
    async fn handle(&mut self, line: RawLog) -> bool {
        self.send(line).await.is_ok()
    }
}

/// `drain` 한 번의 결과
enum Flow {
    /// 읽을 데이터를 모두 처리함
    CaughtUp,
    /// 한도에 걸려 남은 데이터가 있음
    Backlog,
    /// 취소되었거나 핸들러가 닫힘
    Stop,
}

/// 읽었지만 아직 오프셋에 반영하지 않은 라인 묶음
struct Batch {
    /// 라인과 그 라인 바로 다음의 오프셋
    lines: Vec<(RawLog, u64)>,
    /// 완전히 소비한 위치 (버린 라인과 빈 라인 포함)
    end: u64,
    /// 읽기 시작 시 관측한 수정 시각
    modified: Option<SystemTime>,
    /// 읽는 도중 발생한 에러
    error: Option<LogPipelineError>,
}

impl Batch {
    fn unchanged(offset: u64, modified: Option<SystemTime>) -> Self {
        Self {
            lines: Vec::new(),
            end: offset,
            modified,
            error: None,
        }
    }
}

/// 파일 테일러
///
/// 파일 하나의 읽기 위치와 파일 핸들을 소유합니다.
pub struct FileTailer {
    state: TailState,
    format: SourceKind,
    options: TailerOptions,
    source: String,
}

impl FileTailer {
    /// 시작 위치 옵션에 따라 테일러를 엽니다.
    ///
    /// `End`이면 현재 파일 크기에서 시작합니다. 파일이 아직 없으면 오프셋 0에서
    /// 시작하여, 나중에 생성된 파일은 처음부터 읽습니다.
    pub async fn open(path: impl Into<PathBuf>, format: SourceKind, options: TailerOptions) -> Self {
        let mut state = TailState::new(path);

        if options.start_position == StartPosition::End {
            match io_op(&state.path, options.io_timeout, "stat", tokio::fs::metadata(&state.path)).await {
                Ok(meta) => {
                    state.offset = meta.len();
                    state.last_modified = meta.modified().ok();
                    state.file_id = FileId::of(&meta);
                }
                Err(e) if e.is_not_found() => {
                    debug!(path = %state.path.display(), "log file does not exist yet");
                }
                Err(e) => {
                    warn!(path = %state.path.display(), error = %e, "failed to stat log file, starting at offset 0");
                }
            }
        }

        Self::resume(state, format, options)
    }

    /// 저장해 둔 상태에서 이어서 읽는 테일러를 만듭니다.
    pub fn resume(state: TailState, format: SourceKind, options: TailerOptions) -> Self {
        let source = state.path.display().to_string();
        Self {
            state,
            format,
            options,
            source,
        }
    }

    /// 현재 위치 상태
    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// 감시 중인 파일 경로
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// 로그 형식
    pub fn format(&self) -> SourceKind {
        self.format
    }

    /// 새 데이터를 확인하고 완전한 라인마다 `on_line`을 호출합니다.
    ///
    /// 반환값은 넘긴 라인 수입니다. 파일이 바뀌지 않았으면 아무것도 하지 않고
    /// `Ok(0)`을 반환합니다. 줄바꿈이 없는 마지막 조각은 소비하지 않습니다.
    ///
    /// 읽는 도중 에러가 나면 이미 넘긴 라인까지는 오프셋에 반영한 뒤 에러를 반환합니다.
    pub async fn poll_once<F>(&mut self, mut on_line: F) -> Result<usize, LogPipelineError>
    where
        F: FnMut(RawLog),
    {
        let Batch {
            lines,
            end,
            modified,
            error,
        } = self.read_batch().await?;

        let emitted = lines.len();
        for (line, _) in lines {
            on_line(line);
        }
        self.commit(end, modified, error)?;
        Ok(emitted)
    }

    /// 새 데이터를 읽되 오프셋은 옮기지 않습니다.
    ///
    /// 로테이션이나 truncation으로 인한 0으로의 재설정과 파일 식별자는 즉시
    /// 반영합니다. 읽은 위치는 호출한 쪽이 묶음 단위나 라인 단위로 반영합니다.
    async fn read_batch(&mut self) -> Result<Batch, LogPipelineError> {
        let path = self.state.path.clone();
        let limit = self.options.io_timeout;
        let label = self.format.as_str();

        let meta = io_op(&path, limit, "stat", tokio::fs::metadata(&path)).await?;
        let size = meta.len();
        let modified = meta.modified().ok();
        let file_id = FileId::of(&meta);

        let replaced = matches!(
            (self.state.file_id, file_id),
            (Some(old), Some(new)) if old != new
        );

        if replaced {
            info!(path = %path.display(), "log file replaced, reading new file from the beginning");
            counter!(m::TAILER_TRUNCATIONS_TOTAL, m::LABEL_SOURCE => label).increment(1);
            self.state.offset = 0;
        } else if size < self.state.offset {
            info!(
                path = %path.display(),
                size,
                offset = self.state.offset,
                "log file truncated, reading from the beginning"
            );
            counter!(m::TAILER_TRUNCATIONS_TOTAL, m::LABEL_SOURCE => label).increment(1);
            self.state.offset = 0;
        } else if size == self.state.offset && !is_newer(modified, self.state.last_modified) {
            return Ok(Batch::unchanged(self.state.offset, self.state.last_modified));
        }
        self.state.file_id = file_id;

        let base = self.state.offset;
        let mut file = io_op(&path, limit, "open", tokio::fs::File::open(&path)).await?;
        io_op(&path, limit, "seek", file.seek(SeekFrom::Start(base))).await?;

        let received_at = Utc::now();
        let max_lines = self.options.max_lines_per_poll.max(1);
        let mut splitter = LineSplitter::new(self.options.max_line_length);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut lines = Vec::new();

        let error = loop {
            let n = match io_op(&path, limit, "read", file.read(&mut chunk)).await {
                Ok(0) => break None,
                Ok(n) => n,
                Err(e) => break Some(e),
            };

            splitter.feed(&chunk[..n], max_lines - lines.len(), |line, consumed| {
                let raw = RawLog::new(Bytes::copy_from_slice(line), self.source.as_str(), self.format)
                    .with_received_at(received_at);
                lines.push((raw, base + consumed));
            });

            if lines.len() >= max_lines {
                break None;
            }
        };

        if splitter.dropped > 0 {
            warn!(
                path = %path.display(),
                dropped = splitter.dropped,
                max_line_length = self.options.max_line_length,
                "dropped overlong log lines"
            );
            counter!(m::TAILER_LINES_DROPPED_TOTAL, m::LABEL_SOURCE => label).increment(splitter.dropped);
        }
        counter!(m::TAILER_LINES_READ_TOTAL, m::LABEL_SOURCE => label).increment(lines.len() as u64);

        Ok(Batch {
            lines,
            end: base + splitter.consumed,
            modified,
            error,
        })
    }

    /// 묶음 전체를 처리한 뒤 오프셋을 `end`로 옮깁니다.
    ///
    /// 읽기 에러가 있었으면 수정 시각은 갱신하지 않아 다음 트리거에서 다시 읽습니다.
    fn commit(
        &mut self,
        end: u64,
        modified: Option<SystemTime>,
        error: Option<LogPipelineError>,
    ) -> Result<(), LogPipelineError> {
        self.state.offset = end;
        match error {
            Some(e) => Err(e),
            None => {
                self.state.last_modified = modified;
                Ok(())
            }
        }
    }

    /// 취소될 때까지 파일을 따라가며 라인을 `handler`에 넘깁니다.
    ///
    /// I/O 에러로는 종료하지 않습니다. 파일이 없으면 매 트리거마다 다시 시도합니다.
    /// 종료 시 마지막 위치 상태를 반환합니다. 오프셋은 `handler`가 받아들인
    /// 마지막 라인 다음을 가리키므로, 이 상태로 재개하면 넘기지 못한 라인부터 읽습니다.
    pub async fn watch<H: LineHandler>(mut self, mut handler: H, cancel: CancellationToken) -> TailState {
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let watcher = self.spawn_watcher(wake_tx);

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %self.state.path.display(),
            format = %self.format,
            offset = self.state.offset,
            notify = watcher.is_some(),
            "tailer started"
        );

        'outer: loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(()) = wake_rx.recv() => {}
                _ = ticker.tick() => {}
            }

            loop {
                match self.drain(&mut handler, &cancel).await {
                    Flow::CaughtUp => break,
                    Flow::Backlog => continue,
                    Flow::Stop => break 'outer,
                }
            }
        }

        drop(watcher);
        info!(path = %self.state.path.display(), offset = self.state.offset, "tailer stopped");
        self.state
    }

    async fn drain<H: LineHandler>(&mut self, handler: &mut H, cancel: &CancellationToken) -> Flow {
        let Batch {
            lines,
            end,
            modified,
            error,
        } = match self.read_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                self.report_read_error(&e);
                return Flow::CaughtUp;
            }
        };
        let full = lines.len() >= self.options.max_lines_per_poll.max(1);

        for (line, line_end) in lines {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Flow::Stop,
                delivered = handler.handle(line) => {
                    if !delivered {
                        debug!(path = %self.state.path.display(), "line handler closed");
                        return Flow::Stop;
                    }
                    self.state.offset = line_end;
                }
            }
        }

        match self.commit(end, modified, error) {
            Err(e) => {
                self.report_read_error(&e);
                Flow::CaughtUp
            }
            Ok(()) if full => Flow::Backlog,
            Ok(()) => Flow::CaughtUp,
        }
    }

    fn report_read_error(&self, e: &LogPipelineError) {
        if e.is_not_found() {
            debug!(path = %self.state.path.display(), "log file not found, will retry");
        } else {
            warn!(path = %self.state.path.display(), error = %e, "failed to read log file, will retry");
            counter!(m::TAILER_IO_ERRORS_TOTAL, m::LABEL_SOURCE => self.format.as_str()).increment(1);
        }
    }

    /// 부모 디렉토리 변경 알림을 `wake`로 전달하는 감시기를 만듭니다.
    ///
    /// 만들 수 없으면 경고를 남기고 `None`을 반환합니다 (폴링만 사용).
    fn spawn_watcher(&self, wake: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
        let file_name = self.state.path.file_name()?.to_owned();
        let dir = match self.state.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                    // 이미 깨울 신호가 대기 중이면 합쳐집니다
                    let _ = wake.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "file watcher error"),
        };

        let mut watcher = match RecommendedWatcher::new(handler, NotifyConfig::default()) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "failed to create file watcher, polling only");
                return None;
            }
        };

        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(dir = %dir.display(), error = %e, "failed to watch directory, polling only");
            return None;
        }
        Some(watcher)
    }
}

fn is_newer(current: Option<SystemTime>, last: Option<SystemTime>) -> bool {
    match (current, last) {
        (Some(current), Some(last)) => current > last,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

async fn io_op<T>(
    path: &Path,
    limit: Duration,
    op: &str,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T, LogPipelineError> {
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(LogPipelineError::from),
        Err(_) => Err(LogPipelineError::Tailer {
            path: path.display().to_string(),
            reason: format!("{op} timed out after {}ms", limit.as_millis()),
        }),
    }
}

/// 바이트 청크를 완전한 라인으로 나눕니다.
///
/// 줄바꿈이 없는 조각은 다음 청크가 올 때까지 보관하며, 최대 길이를 넘으면
/// 보관하지 않고 해당 라인이 끝날 때 버린 것으로 셉니다.
struct LineSplitter {
    max_line_length: usize,
    /// 현재 라인의 보관 중인 바이트
    pending: Vec<u8>,
    /// 현재 라인이 이미 최대 길이를 넘었는지
    overflow: bool,
    /// 현재 라인에서 지금까지 읽은 바이트 수 (버린 바이트 포함)
    partial_len: u64,
    /// 완전히 소비한 바이트 수 (마지막 줄바꿈까지)
    consumed: u64,
    /// 길이 초과로 버린 라인 수
    dropped: u64,
}

impl LineSplitter {
    fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            pending: Vec::new(),
            overflow: false,
            partial_len: 0,
            consumed: 0,
            dropped: 0,
        }
    }

    /// 청크를 처리하고 넘긴 라인 수를 반환합니다. `limit`개를 넘기면 멈춥니다.
    ///
    /// `emit`은 라인과 그 라인까지 소비한 바이트 수를 받습니다.
    /// 한도에 걸려 멈추면 남은 바이트는 소비하지 않습니다.
    fn feed(&mut self, chunk: &[u8], limit: usize, mut emit: impl FnMut(&[u8], u64)) -> usize {
        let mut emitted = 0;
        let mut rest = chunk;

        while emitted < limit {
            let Some(pos) = rest.iter().position(|b| *b == b'\n') else {
                break;
            };
            let segment = &rest[..pos];
            self.consumed += self.partial_len + pos as u64 + 1;

            if self.overflow || self.pending.len() + segment.len() > self.max_line_length {
                self.dropped += 1;
            } else {
                self.pending.extend_from_slice(segment);
                let line = self.pending.strip_suffix(b"\r").unwrap_or(&self.pending);
                if !line.is_empty() {
                    emit(line, self.consumed);
                    emitted += 1;
                }
            }

            self.partial_len = 0;
            self.pending.clear();
            self.overflow = false;
            rest = &rest[pos + 1..];
        }

        if emitted >= limit {
            return emitted;
        }

        self.partial_len += rest.len() as u64;
        if !self.overflow {
            if self.pending.len() + rest.len() > self.max_line_length {
                self.overflow = true;
                self.pending.clear();
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        emitted
    }
}
