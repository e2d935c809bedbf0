//! UseCase 層のエラー型

use chatrelay_shared::message::MessageType;
use thiserror::Error;

/// 参加（ハンドシェイク）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// 表示名が使用中（その接続のみ終了し、サーバーには影響しない）
    #[error("username '{0}' is already taken")]
    NameTaken(String),
}

/// ルーティングのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// 宛先が不正（メッセージは破棄され、送信者に通知する。接続は継続）
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// クライアントが送ってはならない種別（join / leave / system）
    #[error("clients may not send '{0:?}' records")]
    Forbidden(MessageType),

    /// 配信用に付加したフィールドを含めるとフレームの上限を超える
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("message could not be encoded: {0}")]
    Unencodable(String),
}
