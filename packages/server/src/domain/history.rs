//! History Store trait 定義
//!
//! ルーティングエンジンが必要とする永続化のインターフェース。
//! 契約は「1 件追記する」「直近 N 件を古い順に取得する」の 2 つのみで、
//! 具体的な保存方式は Infrastructure 層が提供する（依存性の逆転）。

use async_trait::async_trait;
use chatrelay_shared::message::ChatMessage;
use serde::{Deserialize, Serialize};

use super::error::HistoryError;

/// 永続化された履歴レコード
///
/// `seq` はストアが採番する単調増加の連番。書き込み後に変更されることはない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// History Store trait
///
/// 複数の接続タスクから同時に呼ばれても既存レコードを壊さないこと。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// レコードを 1 件追記し、採番した連番を返す
    async fn append(&self, message: &ChatMessage) -> Result<u64, HistoryError>;

    /// 直近 `limit` 件を追記順（古い順）で返す
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError>;
}
