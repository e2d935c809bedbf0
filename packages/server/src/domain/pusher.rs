//! 接続ごとの送信キュー
//!
//! ルーティングエンジンは受信者のソケットへ直接書き込まず、このチャンネルに
//! 積むだけにする。実際の書き込みは接続ごとの writer タスクが行うため、
//! 遅い受信者がレジストリのロックや他の接続の配信を止めることはない。

use chatrelay_shared::message::ChatMessage;
use tokio::sync::mpsc;

/// writer タスクへの指示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// レコードを 1 件送信する
    Record(ChatMessage),
    /// キューをここで打ち切り、トランスポートを閉じる
    Close,
}

/// writer タスクへの送信チャンネル
pub type PusherChannel = mpsc::UnboundedSender<Outbound>;
