//! ドメイン層のエラー型
//!
//! 接続単位のエラーはすべてその接続のライフサイクル遷移として処理され、
//! 他の接続やリスナーには伝播しない。

use chatrelay_shared::message::MessageType;
use thiserror::Error;

/// 値オブジェクトの生成エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("display name must not be empty")]
    EmptyDisplayName,

    #[error("display name must be at most {max} characters")]
    DisplayNameTooLong { max: usize },

    #[error("display name must not contain whitespace")]
    DisplayNameWhitespace,

    #[error("display name '{0}' is reserved")]
    ReservedDisplayName(String),
}

/// ワイヤレコードからエンベロープへの変換エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("'{kind:?}' record is missing '{field}'")]
    MissingField {
        kind: MessageType,
        field: &'static str,
    },
}

/// 接続レジストリのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// 表示名が別の接続で使用中
    #[error("display name '{0}' is already taken")]
    NameTaken(String),
}

/// 履歴ストアのエラー（ベストエフォート: ログに記録し配信は継続する）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history persistence failed: {0}")]
    Persistence(String),
}

impl From<std::io::Error> for HistoryError {
    fn from(e: std::io::Error) -> Self {
        HistoryError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Persistence(e.to_string())
    }
}

/// 配信エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// 宛先の選定後、送信前に受信者がいなくなった
    #[error("recipient '{0}' is no longer available")]
    RecipientUnavailable(String),
}
