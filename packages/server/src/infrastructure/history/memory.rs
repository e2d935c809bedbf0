//! InMemory History Store 実装
//!
//! 履歴ファイルが設定されていない場合とテストで使用する。
//! プロセス終了とともに内容は失われる。

use async_trait::async_trait;
use chatrelay_shared::message::ChatMessage;
use tokio::sync::Mutex;

use crate::domain::{HistoryError, HistoryRecord, HistoryStore};

#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<u64, HistoryError> {
        let mut records = self.records.lock().await;
        let seq = records.last().map_or(1, |r| r.seq + 1);
        records.push(HistoryRecord {
            seq,
            message: message.clone(),
        });
        Ok(seq)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self.records.lock().await;
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }
}
