//! UseCase: ルーティングエンジン
//!
//! 受信したレコードごとに「誰に届けるか」を決め、履歴と接続レジストリを更新する。
//!
//! ## 処理の流れ
//!
//! 1. 分類: `@name rest` → direct, `!name rest` → excluded, それ以外 → message
//! 2. 宛先検証: 自分自身への direct / 自分自身の除外は `InvalidTarget`
//! 3. サイズ検証: ID・時刻・送信者名を付けた後のフレームが上限を超えれば `TooLarge`
//! 4. 受信者選定: レジストリのロック内で `is_recipient` を適用
//! 5. 配信: 各受信者の送信キューに積む（ソケットへの書き込みは writer タスク）
//! 6. 永続化: typing / ack 以外を History Store に追記（失敗してもログのみ）
//!
//! ## 排他
//!
//! 履歴ミラーのロック → レジストリのロックの順で取得する。永続化対象の受信者選定と
//! ミラーへの追加は同じ区間で行い、参加処理（再送の取得と登録）も同じ区間で行う。
//! これにより参加直後の接続は各レコードを「再送」か「ライブ配信」のどちらか一方で
//! 必ず 1 回だけ受け取る。

use std::sync::Arc;

use chatrelay_shared::{
    codec::{CodecError, FrameCodec},
    message::{ChatMessage, MessageType},
    time::Clock,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::{
        ConnectionId, DisplayName, Envelope, HistoryError, HistoryStore, Kind, Outbound,
        PusherChannel, RegistryError, classify_body, is_recipient, validate_target,
    },
    infrastructure::{ConnectionRegistry, Recipient, history::HistoryMirror},
};

use super::error::{JoinError, RouteError};

/// 1 件のルーティング結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// 配信したレコード
    pub message: ChatMessage,
    /// 実際に送信キューに積めた受信者（名前順）
    pub recipients: Vec<DisplayName>,
    pub persisted: bool,
}

/// 参加処理の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// 再送した履歴の件数
    pub replayed: usize,
    /// 参加直後の接続中ユーザー（名前順）
    pub online: Vec<DisplayName>,
}

/// ルーティングエンジン
pub struct RoutingEngine {
    /// 接続レジストリ
    registry: Arc<ConnectionRegistry>,
    /// History Store（永続化の抽象化）
    store: Arc<dyn HistoryStore>,
    /// 再送用の直近履歴
    mirror: Mutex<HistoryMirror>,
    clock: Arc<dyn Clock>,
    /// 送信側と同じ上限で配信前のレコードを検査する
    codec: FrameCodec,
}

impl RoutingEngine {
    /// 新しい RoutingEngine を作成
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        history_capacity: usize,
    ) -> Self {
        Self {
            registry,
            store,
            mirror: Mutex::new(HistoryMirror::new(history_capacity)),
            clock,
            codec: FrameCodec::default(),
        }
    }

    /// 配信するフレームの最大長を設定する（接続の送受信と同じ値にする）
    pub fn with_frame_limit(mut self, max_frame_len: usize) -> Self {
        self.codec = FrameCodec::new(max_frame_len);
        self
    }

    /// History Store の直近レコードで履歴ミラーを初期化する
    ///
    /// 再起動後も新規接続に直前の会話を再送するため、起動時に 1 回呼ぶ。
    pub async fn warm_history(&self) -> Result<usize, HistoryError> {
        let capacity = self.mirror.lock().await.capacity();
        let records = self.store.recent(capacity).await?;

        let mut mirror = self.mirror.lock().await;
        let mut loaded = 0;
        for record in records {
            match Envelope::try_from(record.message) {
                Ok(envelope) if envelope.kind.is_persisted() => {
                    mirror.push(envelope);
                    loaded += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping history record {}: {}", record.seq, e),
            }
        }
        Ok(loaded)
    }

    /// 1 接続宛ての system レコードを作る（永続化しない）
    pub fn notice(&self, body: impl Into<String>) -> ChatMessage {
        Envelope::system(body, self.clock.now_millis()).to_wire()
    }

    /// 接続中ユーザー一覧
    pub async fn users(&self) -> Vec<DisplayName> {
        self.registry.snapshot_names().await
    }

    /// 参加処理
    ///
    /// 閲覧権限でフィルタした履歴を `channel` に古い順で積み、レジストリに登録し、
    /// 他の接続に `join` を配信する。表示名が使用中なら `NameTaken` を返し、
    /// 何も配信しない。
    pub async fn join(
        &self,
        id: ConnectionId,
        name: DisplayName,
        channel: PusherChannel,
    ) -> Result<JoinOutcome, JoinError> {
        let replayed = {
            let mirror = self.mirror.lock().await;
            let replay = mirror.visible_to(name.as_str());
            for envelope in &replay {
                // 受信側はまだこの関数の呼び出し元が保持している
                let _ = channel.send(Outbound::Record(envelope.to_wire()));
            }
            match self.registry.register(id, name.clone(), channel).await {
                Ok(()) => replay.len(),
                Err(RegistryError::NameTaken(taken)) => return Err(JoinError::NameTaken(taken)),
            }
        };
        tracing::info!(
            "'{}' joined as connection {} ({} history records replayed)",
            name,
            id,
            replayed
        );

        let joined = Envelope::presence(
            Kind::Join,
            name.as_str(),
            format!("{} has joined the chat", name),
            self.clock.now_millis(),
        );
        self.dispatch(joined).await;

        Ok(JoinOutcome {
            replayed,
            online: self.registry.snapshot_names().await,
        })
    }

    /// 退出処理
    ///
    /// レジストリから削除できた場合のみ `leave` を配信する。複数回呼ばれても
    /// `leave` は 1 回しか配信されない。
    pub async fn leave(&self, id: &ConnectionId) -> Option<DisplayName> {
        let name = self.registry.unregister(id).await?;
        tracing::info!("'{}' left (connection {})", name, id);

        let left = Envelope::presence(
            Kind::Leave,
            name.as_str(),
            format!("{} has left the chat", name),
            self.clock.now_millis(),
        );
        self.dispatch(left).await;
        Some(name)
    }

    /// 接続 `sender` から受信したレコードをルーティングする
    ///
    /// 送信者名とタイムスタンプはサーバー側で上書きする。
    pub async fn route(
        &self,
        sender: &DisplayName,
        message: ChatMessage,
    ) -> Result<Delivery, RouteError> {
        let ChatMessage {
            id,
            r#type,
            message: body,
            target_user,
            excluded_user,
            color,
            is_typing,
            message_id,
            ..
        } = message;

        let (kind, body) = match r#type {
            MessageType::Message => classify_body(&body),
            MessageType::Direct => (
                Kind::Direct {
                    target: target_user.unwrap_or_default(),
                },
                body,
            ),
            MessageType::Excluded => (
                Kind::Excluded {
                    excluded: excluded_user.unwrap_or_default(),
                },
                body,
            ),
            MessageType::Typing => (
                Kind::Typing {
                    is_typing: is_typing.unwrap_or(true),
                },
                String::new(),
            ),
            MessageType::Ack => match message_id {
                Some(message_id) => (Kind::Ack { message_id }, String::new()),
                None => {
                    return Err(RouteError::InvalidTarget(
                        "an ack needs the id of the acknowledged message".to_string(),
                    ));
                }
            },
            other @ (MessageType::Join | MessageType::Leave | MessageType::System) => {
                return Err(RouteError::Forbidden(other));
            }
        };

        if let Err(reason) = validate_target(sender.as_str(), &kind) {
            tracing::debug!("Dropping message from '{}': {}", sender, reason);
            return Err(RouteError::InvalidTarget(reason));
        }

        // ack の宛先解決に使うため、永続化するレコードには必ず ID を振る
        let id = if kind.is_persisted() {
            Some(id.unwrap_or_else(|| Uuid::new_v4().to_string()))
        } else {
            id
        };
        let offline_target = match &kind {
            Kind::Direct { target } => Some(target.clone()),
            _ => None,
        };

        let envelope = Envelope {
            id,
            sender: sender.to_string(),
            body,
            color,
            timestamp: self.clock.now_millis(),
            kind,
        };
        // 付加したフィールドで上限を超えたレコードは配信も永続化もしない
        match self.codec.encode(&envelope.to_wire()) {
            Ok(_) => {}
            Err(CodecError::MessageTooLarge { len, max }) => {
                tracing::info!("Dropping {} byte record from '{}'", len, sender);
                return Err(RouteError::TooLarge { len, max });
            }
            Err(e) => return Err(RouteError::Unencodable(e.to_string())),
        }
        let delivery = self.dispatch(envelope).await;

        if let Some(target) = offline_target
            && !delivery.recipients.iter().any(|n| *n == *target)
        {
            self.notify_name(
                sender.as_str(),
                format!("{} is not online; the message was kept in history", target),
            )
            .await;
        }

        Ok(delivery)
    }

    /// 全接続に system レコードを配信する（永続化する）
    pub async fn broadcast_system(&self, body: impl Into<String>) -> Delivery {
        self.dispatch(Envelope::system(body, self.clock.now_millis()))
            .await
    }

    /// サーバー停止: 全接続に通知を送ってから writer タスクに終了を指示する
    pub async fn shutdown_all(&self, notice: impl Into<String>) -> usize {
        self.broadcast_system(notice).await;
        let recipients = self.registry.all().await;
        for recipient in &recipients {
            if let Err(e) = recipient.close() {
                tracing::debug!("Skipping close during shutdown: {}", e);
            }
        }
        recipients.len()
    }

    async fn notify_name(&self, name: &str, body: String) {
        if let Some(recipient) = self.registry.find_by_name(name).await
            && let Err(e) = recipient.push(self.notice(body))
        {
            tracing::debug!("Notice not delivered: {}", e);
        }
    }

    /// 受信者選定・配信・永続化
    async fn dispatch(&self, envelope: Envelope) -> Delivery {
        let persisted = envelope.kind.is_persisted();
        let recipients = match &envelope.kind {
            Kind::Ack { message_id } => self.ack_recipients(&envelope.sender, message_id).await,
            kind if persisted => {
                let mut mirror = self.mirror.lock().await;
                let recipients = self
                    .registry
                    .select(|name| is_recipient(kind, &envelope.sender, name.as_str()))
                    .await;
                mirror.push(envelope.clone());
                recipients
            }
            kind => {
                self.registry
                    .select(|name| is_recipient(kind, &envelope.sender, name.as_str()))
                    .await
            }
        };

        let message = envelope.to_wire();
        let mut delivered = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            match recipient.push(message.clone()) {
                Ok(()) => delivered.push(recipient.name),
                // 選定後に切断された受信者は読み飛ばす
                Err(e) => tracing::debug!("Skipping recipient: {}", e),
            }
        }
        delivered.sort();

        if persisted && let Err(e) = self.store.append(&message).await {
            tracing::error!(
                "Failed to persist {:?} from '{}' (delivered anyway): {}",
                message.r#type,
                message.username,
                e
            );
        }

        tracing::debug!(
            "Routed {:?} from '{}' to {} recipient(s)",
            message.r#type,
            message.username,
            delivered.len()
        );

        Delivery {
            message,
            recipients: delivered,
            persisted,
        }
    }

    /// ack は確認対象レコードの送信者にのみ届ける
    async fn ack_recipients(&self, acker: &str, message_id: &str) -> Vec<Recipient> {
        let original_sender = {
            let mirror = self.mirror.lock().await;
            mirror.find_by_id(message_id).map(|e| e.sender.clone())
        };
        match original_sender {
            Some(sender) if sender != acker => {
                self.registry.find_by_name(&sender).await.into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}
