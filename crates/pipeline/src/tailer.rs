//! 트랩 로그 테일러 -- 외부 데몬이 기록하는 파일의 라인 단위 커서
//!
//! 외부 트랩 데몬이 append한 로그를 논리 레코드 단위로 읽습니다.
//! 논리 레코드는 `SNMP`로 시작하는 라인 하나와, 그 뒤에 이어지는
//! `SNMP`로 시작하지 않는 연속 라인들을 이어 붙인 것입니다.
//!
//! # 재시작 복구
//! 레코드 하나를 소비할 때마다 호출 측이 [`LogTailer::checkpoint`]로
//! `<로그경로>.index` 파일에 `"{last_line} {last_size}"`를 기록합니다.
//! 재시작 시 인덱스에 기록된 수만큼 레코드를 건너뛰어 이어서 읽습니다.
//! 인덱스 기록은 fsync하지 않으므로 크래시 시 마지막 레코드 하나가
//! 중복 처리될 수 있습니다 (at-least-once).
//!
//! # 로테이션 감지
//! 파일 크기가 `last_size`보다 작아지면 truncate/rotate로 간주하고
//! 인덱스를 삭제한 뒤 오프셋 0부터 다시 읽습니다. inode는 추적하지
//! 않으며 크기 축소만을 신호로 사용합니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{File, metadata};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::TrapPipelineError;

/// 불완전 라인 대기 재시도 횟수
const DEFAULT_INCOMPLETE_RETRIES: u32 = 10;
/// 불완전 라인 재시도 간격
const DEFAULT_INCOMPLETE_WAIT: Duration = Duration::from_secs(1);

/// 레코드 시작을 나타내는 라인 접두어
const RECORD_PREFIX: &str = "SNMP";

/// 로그 파일 경로에서 인덱스 파일 경로를 유도합니다.
fn index_path_for(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(".index");
    PathBuf::from(name)
}

/// 트랩 로그 파일 커서
///
/// 파일 핸들은 프로세스 생애 동안 유지되며, truncate 감지 시에만
/// 다시 엽니다.
pub struct LogTailer {
    /// 대상 로그 파일 경로
    log_path: PathBuf,
    /// 인덱스 파일 경로 (`log_path` + ".index")
    index_path: PathBuf,
    /// 버퍼링된 읽기 핸들
    reader: BufReader<File>,
    /// 소비한 논리 레코드 수 (1-based)
    last_line: u64,
    /// 소비한 바이트 오프셋
    last_size: u64,
    /// 파일에서 읽어 들인 총 바이트 (read-ahead 포함)
    offset: u64,
    /// 다음 레코드의 시작으로 판정되어 보관 중인 look-ahead 라인
    read_ahead: Option<String>,
    /// 불완전 라인 대기 재시도 횟수
    incomplete_retries: u32,
    /// 불완전 라인 재시도 간격
    incomplete_wait: Duration,
}

impl LogTailer {
    /// 로그 파일을 열고 인덱스에 기록된 위치까지 건너뜁니다.
    ///
    /// # Errors
    /// 로그 파일을 열 수 없으면 실패합니다 (시작 시점 치명 에러).
    /// 인덱스 파일을 읽을 수 없으면 `(0, 0)`으로 간주하고 계속합니다.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TrapPipelineError> {
        let log_path = path.into();
        let index_path = index_path_for(&log_path);

        let file = File::open(&log_path)
            .await
            .map_err(|e| TrapPipelineError::Tailer {
                path: log_path.display().to_string(),
                reason: format!("failed to open log file: {e}"),
            })?;

        let mut tailer = Self {
            log_path,
            index_path,
            reader: BufReader::new(file),
            last_line: 0,
            last_size: 0,
            offset: 0,
            read_ahead: None,
            incomplete_retries: DEFAULT_INCOMPLETE_RETRIES,
            incomplete_wait: DEFAULT_INCOMPLETE_WAIT,
        };

        let (saved_line, saved_size) = tailer.read_index().await;
        if saved_line > 0 || saved_size > 0 {
            let current = metadata(&tailer.log_path).await.map(|m| m.len()).unwrap_or(0);
            if current < saved_size {
                info!(
                    path = %tailer.log_path.display(),
                    current,
                    saved_size,
                    "log file shrank since last checkpoint, restarting from offset 0"
                );
                tailer.remove_index().await;
            } else {
                tailer.skip_records(saved_line).await?;
                debug!(
                    path = %tailer.log_path.display(),
                    skipped = saved_line,
                    "resumed from index checkpoint"
                );
            }
        }

        Ok(tailer)
    }

    /// 불완전 라인 대기 파라미터를 설정합니다.
    pub fn with_incomplete_wait(mut self, retries: u32, wait: Duration) -> Self {
        self.incomplete_retries = retries;
        self.incomplete_wait = wait;
        self
    }

    /// 대상 로그 파일 경로를 반환합니다.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// 소비한 논리 레코드 수를 반환합니다.
    pub fn last_line(&self) -> u64 {
        self.last_line
    }

    /// 소비한 바이트 오프셋을 반환합니다.
    pub fn last_size(&self) -> u64 {
        self.last_size
    }

    /// 다음 논리 레코드를 읽습니다.
    ///
    /// 레코드가 더 없으면 `None`을 반환합니다. 레코드 끝에 개행이 아직
    /// 기록되지 않은 경우 최대 `retries * wait` 동안 추가 데이터를
    /// 기다린 뒤, 그래도 불완전하면 누적된 내용을 그대로 반환합니다.
    /// 반환되는 레코드에서 마지막 개행은 제거되며, 연속 라인 사이의
    /// 개행은 보존됩니다.
    pub async fn next_record(&mut self) -> Result<Option<String>, TrapPipelineError> {
        let mut record = String::new();

        match self.read_ahead.take() {
            Some(line) => record.push_str(&line),
            None => {
                if self.read_line(&mut record).await? == 0 {
                    return Ok(None);
                }
            }
        }

        // 논리 라인 하나당 불완전 대기 예산
        let mut tries = 0;

        loop {
            // 현재 물리 라인이 아직 개행으로 끝나지 않았으면 추가 기록을 기다림
            while !record.ends_with('\n') && tries < self.incomplete_retries {
                tries += 1;
                sleep(self.incomplete_wait).await;
                self.read_line(&mut record).await?;
            }
            if !record.ends_with('\n') {
                debug!(
                    path = %self.log_path.display(),
                    "giving up on incomplete record, delivering accumulated bytes"
                );
                break;
            }

            // look-ahead: 다음 라인이 새 레코드의 시작이면 보관하고 종료
            let mut next_line = String::new();
            if self.read_line(&mut next_line).await? == 0 {
                break;
            }
            if next_line.starts_with(RECORD_PREFIX) {
                self.read_ahead = Some(next_line);
                break;
            }
            record.push_str(&next_line);
        }

        let stash_len = self.read_ahead.as_ref().map_or(0, |l| l.len() as u64);
        self.last_size = self.offset - stash_len;
        self.last_line += 1;

        if record.ends_with('\n') {
            record.pop();
        }
        Ok(Some(record))
    }

    /// 현재 커서 위치를 인덱스 파일에 기록합니다.
    ///
    /// 레코드 하나를 소비한 직후, 다음 레코드를 읽기 전에 호출해야
    /// 합니다.
    pub async fn checkpoint(&self) -> Result<(), TrapPipelineError> {
        tokio::fs::write(
            &self.index_path,
            format!("{} {}", self.last_line, self.last_size),
        )
        .await
        .map_err(|e| TrapPipelineError::Tailer {
            path: self.log_path.display().to_string(),
            reason: format!("failed to write index checkpoint: {e}"),
        })
    }

    /// truncate/rotate 여부를 확인하고, 감지되면 커서를 초기화합니다.
    ///
    /// 감지 시 인덱스 파일을 삭제하고 파일을 다시 열어 오프셋 0부터
    /// 읽습니다. 리셋 여부를 반환합니다.
    pub async fn check_truncation(&mut self) -> Result<bool, TrapPipelineError> {
        let size = match metadata(&self.log_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(
                    path = %self.log_path.display(),
                    error = %e,
                    "failed to stat log file, skipping rotation check"
                );
                return Ok(false);
            }
        };

        if size >= self.last_size {
            return Ok(false);
        }

        warn!(
            path = %self.log_path.display(),
            size,
            last_size = self.last_size,
            "log file truncated, resetting cursor"
        );

        self.remove_index().await;

        let file = File::open(&self.log_path)
            .await
            .map_err(|e| TrapPipelineError::Tailer {
                path: self.log_path.display().to_string(),
                reason: format!("failed to reopen log file after truncation: {e}"),
            })?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| TrapPipelineError::Tailer {
                path: self.log_path.display().to_string(),
                reason: format!("failed to seek after truncation: {e}"),
            })?;

        self.reader = reader;
        self.last_line = 0;
        self.last_size = 0;
        self.offset = 0;
        self.read_ahead = None;

        Ok(true)
    }

    /// 라인 하나를 읽어 `buf`에 덧붙이고 읽은 바이트 수를 반환합니다.
    async fn read_line(&mut self, buf: &mut String) -> Result<usize, TrapPipelineError> {
        let n = self
            .reader
            .read_line(buf)
            .await
            .map_err(|e| TrapPipelineError::Tailer {
                path: self.log_path.display().to_string(),
                reason: format!("failed to read line: {e}"),
            })?;
        self.offset += n as u64;
        Ok(n)
    }

    /// 인덱스 파일에서 `(last_line, last_size)`를 읽습니다.
    ///
    /// 파일이 없거나 손상된 경우 `(0, 0)`을 반환합니다 (최악의 경우
    /// 전체 재처리).
    async fn read_index(&self) -> (u64, u64) {
        let raw = match tokio::fs::read_to_string(&self.index_path).await {
            Ok(raw) => raw,
            Err(_) => return (0, 0),
        };

        let mut parts = raw.split_whitespace();
        let line = parts.next().and_then(|v| v.parse::<u64>().ok());
        let size = parts.next().and_then(|v| v.parse::<u64>().ok());
        match (line, size) {
            (Some(line), Some(size)) => (line, size),
            _ => {
                warn!(
                    path = %self.index_path.display(),
                    "corrupt index file, restarting from offset 0"
                );
                (0, 0)
            }
        }
    }

    /// 인덱스 파일을 삭제합니다 (없으면 무시).
    async fn remove_index(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.index_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                path = %self.index_path.display(),
                error = %e,
                "failed to remove index file"
            );
        }
    }

    /// 논리 레코드 `count`개를 건너뜁니다 (재시작 복구용).
    async fn skip_records(&mut self, count: u64) -> Result<(), TrapPipelineError> {
        for _ in 0..count {
            if self.next_record().await?.is_none() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 테스트용: 대기 없이 동작하는 테일러를 생성합니다.
    async fn open_fast(path: &Path) -> LogTailer {
        LogTailer::open(path)
            .await
            .unwrap()
            .with_incomplete_wait(1, Duration::from_millis(5))
    }

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
    }

    #[tokio::test]
    async fn open_missing_file_fails() {
        let result = LogTailer::open("/nonexistent/trapflow/snmptrapd.log").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reads_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x"]);

        let mut tailer = open_fast(&path).await;
        let record = tailer.next_record().await.unwrap().unwrap();
        assert_eq!(record, "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x");
        assert_eq!(tailer.last_line(), 1);
        assert!(tailer.last_size() > 0);

        assert!(tailer.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reassembles_continuation_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(
            &path,
            &[
                "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a",
                "continuation one",
                "continuation two",
                "continuation three",
                "SNMPv1[**]2024-01-15[**]10:20:31[**]10.0.0.2[**].1.3[**]6[**]d[**]1[**]v",
            ],
        );

        let mut tailer = open_fast(&path).await;

        let first = tailer.next_record().await.unwrap().unwrap();
        assert!(first.starts_with("SNMPv2"));
        assert!(first.contains("continuation one"));
        assert!(first.contains("continuation two"));
        assert!(first.contains("continuation three"));
        assert_eq!(tailer.last_line(), 1);

        let second = tailer.next_record().await.unwrap().unwrap();
        assert!(second.starts_with("SNMPv1"));
        assert_eq!(tailer.last_line(), 2);
    }

    #[tokio::test]
    async fn last_size_excludes_read_ahead() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        let first = "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a";
        write_lines(
            &path,
            &[first, "SNMPv2[**]2024-01-15[**]10:20:31[**]10.0.0.2[**]b"],
        );

        let mut tailer = open_fast(&path).await;
        tailer.next_record().await.unwrap().unwrap();
        // 첫 레코드의 크기는 자기 라인 + 개행까지만 포함해야 함
        assert_eq!(tailer.last_size(), first.len() as u64 + 1);
    }

    #[tokio::test]
    async fn checkpoint_writes_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a"]);

        let mut tailer = open_fast(&path).await;
        tailer.next_record().await.unwrap().unwrap();
        tailer.checkpoint().await.unwrap();

        let index = std::fs::read_to_string(index_path_for(&path)).unwrap();
        assert_eq!(
            index,
            format!("{} {}", tailer.last_line(), tailer.last_size())
        );
    }

    #[tokio::test]
    async fn resumes_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(
            &path,
            &[
                "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a",
                "SNMPv2[**]2024-01-15[**]10:20:31[**]10.0.0.2[**]b",
            ],
        );

        {
            let mut tailer = open_fast(&path).await;
            tailer.next_record().await.unwrap().unwrap();
            tailer.checkpoint().await.unwrap();
        }

        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:32[**]10.0.0.3[**]c"]);

        let mut tailer = open_fast(&path).await;
        let record = tailer.next_record().await.unwrap().unwrap();
        assert!(record.contains("10.0.0.2"));
        let record = tailer.next_record().await.unwrap().unwrap();
        assert!(record.contains("10.0.0.3"));
        assert!(tailer.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_index_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a"]);
        std::fs::write(index_path_for(&path), "not a checkpoint").unwrap();

        let mut tailer = open_fast(&path).await;
        let record = tailer.next_record().await.unwrap().unwrap();
        assert!(record.contains("10.0.0.1"));
    }

    #[tokio::test]
    async fn detects_truncation_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(
            &path,
            &[
                "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]aaaaaaaaaaaaaaaa",
                "SNMPv2[**]2024-01-15[**]10:20:31[**]10.0.0.2[**]bbbbbbbbbbbbbbbb",
            ],
        );

        let mut tailer = open_fast(&path).await;
        tailer.next_record().await.unwrap().unwrap();
        tailer.next_record().await.unwrap().unwrap();
        tailer.checkpoint().await.unwrap();

        // 파일을 더 짧은 내용으로 교체 (rotate 시뮬레이션)
        std::fs::write(&path, "SNMPv2[**]2024-01-16[**]00:00:00[**]10.0.0.9[**]z\n").unwrap();

        let reset = tailer.check_truncation().await.unwrap();
        assert!(reset);
        assert_eq!(tailer.last_line(), 0);
        assert_eq!(tailer.last_size(), 0);
        assert!(!index_path_for(&path).exists());

        let record = tailer.next_record().await.unwrap().unwrap();
        assert!(record.contains("10.0.0.9"));
    }

    #[tokio::test]
    async fn no_truncation_when_file_grows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a"]);

        let mut tailer = open_fast(&path).await;
        tailer.next_record().await.unwrap().unwrap();

        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:31[**]10.0.0.2[**]b"]);
        assert!(!tailer.check_truncation().await.unwrap());

        let record = tailer.next_record().await.unwrap().unwrap();
        assert!(record.contains("10.0.0.2"));
    }

    #[tokio::test]
    async fn incomplete_record_delivered_after_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        // 개행 없이 기록된 부분 라인
        std::fs::write(&path, "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]part").unwrap();

        let mut tailer = open_fast(&path).await;
        let record = tailer.next_record().await.unwrap().unwrap();
        assert!(record.ends_with("part"));
    }

    #[tokio::test]
    async fn partial_write_completed_during_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        std::fs::write(&path, "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]he").unwrap();

        let mut tailer = LogTailer::open(&path)
            .await
            .unwrap()
            .with_incomplete_wait(20, Duration::from_millis(20));

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(60)).await;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            file.write_all(b"llo\n").unwrap();
        });

        let record = tailer.next_record().await.unwrap().unwrap();
        writer.await.unwrap();
        assert!(record.ends_with("hello"));
    }

    #[tokio::test]
    async fn empty_file_yields_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        std::fs::write(&path, "").unwrap();

        let mut tailer = open_fast(&path).await;
        assert!(tailer.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_past_end_of_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(&path, &["SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]a"]);
        // 인덱스가 파일보다 많은 레코드를 가리키지만 크기는 일치하는 경우
        std::fs::write(index_path_for(&path), "5 10").unwrap();

        let mut tailer = open_fast(&path).await;
        // 있는 만큼만 건너뛰고 이후에는 새 레코드를 기다림
        assert!(tailer.next_record().await.unwrap().is_none());
    }
}
