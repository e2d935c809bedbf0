//! JSON Lines History Store 実装
//!
//! 1 行 1 レコードの追記専用ファイル。`seq` と wire レコードのキーを
//! 同じ JSON オブジェクトに並べて保存する。
//!
//! ```text
//! {"seq":1,"type":"join","username":"alice","message":"alice has joined the chat","timestamp":...}
//! {"seq":2,"id":"...","type":"message","username":"alice","message":"hello","timestamp":...}
//! ```
//!
//! 追記と読み出しはストア内の `Mutex` で直列化する。書き込みを試みた連番は
//! 失敗しても再利用しない。途中まで書けた行は切り詰め、切り詰められなければ
//! 次の追記を改行から始めて後続のレコードを読めるようにする。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chatrelay_shared::message::ChatMessage;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::domain::{HistoryError, HistoryRecord, HistoryStore};

struct Inner {
    file: File,
    next_seq: u64,
    /// 直前の追記が途中の行を残した可能性がある
    torn: bool,
}

pub struct JsonlHistoryStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonlHistoryStore {
    /// ファイルを開く（存在しなければ親ディレクトリごと作成する）
    ///
    /// 既存ファイルがある場合は最後のレコードの続きから採番する。
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let existing = read_records(&path).await?;
        let next_seq = existing.last().map_or(1, |r| r.seq + 1);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!(
            "History file {} opened ({} records)",
            path.display(),
            existing.len()
        );

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                next_seq,
                torn: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<u64, HistoryError> {
        let mut inner = self.inner.lock().await;
        let record = HistoryRecord {
            seq: inner.next_seq,
            message: message.clone(),
        };
        let mut line = Vec::new();
        if inner.torn {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, &record)?;
        line.push(b'\n');

        let start = inner.file.metadata().await?.len();
        inner.next_seq += 1;

        if let Err(e) = write_line(&mut inner.file, &line).await {
            inner.torn = match inner.file.set_len(start).await {
                Ok(()) => false,
                Err(truncate) => {
                    tracing::warn!(
                        "Could not truncate {} after a failed append: {}",
                        self.path.display(),
                        truncate
                    );
                    true
                }
            };
            return Err(e.into());
        }
        inner.torn = false;
        inner.file.sync_data().await?;
        Ok(record.seq)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        // 追記途中の行を読まないようにロックを取る
        let _inner = self.inner.lock().await;
        let mut records = read_records(&self.path).await?;
        let start = records.len().saturating_sub(limit);
        Ok(records.split_off(start))
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// ファイル全体を読み、解析できない行は警告を出して読み飛ばす
async fn read_records(path: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let records = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(
            |(index, line)| match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        "Skipping unreadable history line {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    );
                    None
                }
            },
        )
        .collect();
    Ok(records)
}
