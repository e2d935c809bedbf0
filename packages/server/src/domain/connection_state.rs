//! 接続のライフサイクル状態
//!
//! ```text
//! Connecting → AwaitingJoin → Active → Closing → Closed
//!                    └──────────────────→ Closing
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// トランスポート確立直後
    Connecting,
    /// 最初の join レコード待ち
    AwaitingJoin,
    /// レジストリ登録済み
    Active,
    /// 終了処理中（1 回だけ入る）
    Closing,
    Closed,
}

impl ConnectionState {
    /// `self` から `next` への遷移が許可されているか
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, AwaitingJoin)
                | (Connecting, Closing)
                | (AwaitingJoin, Active)
                | (AwaitingJoin, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingJoin => "awaiting-join",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_can_skip_active() {
        // テスト項目: ハンドシェイク失敗時は Active を経ずに Closing へ遷移できる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert!(ConnectionState::AwaitingJoin.can_transition_to(ConnectionState::Closing));
        assert!(ConnectionState::AwaitingJoin.can_transition_to(ConnectionState::Active));
    }

    #[test]
    fn test_closing_is_entered_once() {
        // テスト項目: Closing / Closed から Closing へは戻れない
        // given (前提条件) / when (操作) / then (期待する結果):
        assert!(!ConnectionState::Closing.can_transition_to(ConnectionState::Closing));
        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Closing));
        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Active));
    }
}
