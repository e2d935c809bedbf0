//! 接続レジストリ
//!
//! ## 責務
//!
//! - 「現在到達可能な接続」と表示名の対応を保持する唯一の情報源
//! - 表示名の一意性の保証
//! - 配信先の選定（ロック内で選び、送信チャンネルを複製して返す）
//!
//! ## 設計ノート
//!
//! 変更操作と配信先の選定はすべて同じ `Mutex` で排他される。
//! `select` はロック内で受信者を決めるが、送信はロック解放後に呼び出し側が行う。
//! 選定後に切断された受信者への送信は `PushError::RecipientUnavailable` になり、
//! 呼び出し側はその受信者を読み飛ばす。

use std::collections::HashMap;

use chatrelay_shared::message::ChatMessage;
use tokio::sync::Mutex;

use crate::domain::{ConnectionId, DisplayName, Outbound, PushError, PusherChannel, RegistryError};

/// レジストリの 1 エントリ
struct Member {
    name: DisplayName,
    channel: PusherChannel,
}

/// 配信先（ロック外で送信するための送信チャンネルの複製）
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: ConnectionId,
    pub name: DisplayName,
    channel: PusherChannel,
}

impl Recipient {
    pub fn new(id: ConnectionId, name: DisplayName, channel: PusherChannel) -> Self {
        Self { id, name, channel }
    }

    /// レコードを送信キューに積む
    pub fn push(&self, message: ChatMessage) -> Result<(), PushError> {
        self.channel
            .send(Outbound::Record(message))
            .map_err(|_| PushError::RecipientUnavailable(self.name.to_string()))
    }

    /// writer タスクに接続を閉じるよう指示する
    pub fn close(&self) -> Result<(), PushError> {
        self.channel
            .send(Outbound::Close)
            .map_err(|_| PushError::RecipientUnavailable(self.name.to_string()))
    }
}

/// 接続レジストリ
#[derive(Default)]
pub struct ConnectionRegistry {
    members: Mutex<HashMap<ConnectionId, Member>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続を登録する
    ///
    /// 表示名が別の接続で使われている場合は `NameTaken` を返し、既存エントリは変更しない。
    pub async fn register(
        &self,
        id: ConnectionId,
        name: DisplayName,
        channel: PusherChannel,
    ) -> Result<(), RegistryError> {
        let mut members = self.members.lock().await;
        if members
            .iter()
            .any(|(member_id, member)| *member_id != id && member.name == name)
        {
            return Err(RegistryError::NameTaken(name.into_string()));
        }
        tracing::debug!("Connection {} registered as '{}'", id, name);
        members.insert(id, Member { name, channel });
        Ok(())
    }

    /// 接続の登録を解除する
    ///
    /// 登録されていた場合のみ表示名を返す。2 回目以降の呼び出しは `None`（冪等）。
    pub async fn unregister(&self, id: &ConnectionId) -> Option<DisplayName> {
        let mut members = self.members.lock().await;
        let removed = members.remove(id).map(|member| member.name);
        if let Some(name) = &removed {
            tracing::debug!("Connection {} ('{}') unregistered", id, name);
        }
        removed
    }

    pub async fn lookup(&self, id: &ConnectionId) -> Option<DisplayName> {
        let members = self.members.lock().await;
        members.get(id).map(|member| member.name.clone())
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Recipient> {
        let members = self.members.lock().await;
        members
            .iter()
            .find(|(_, member)| member.name == *name)
            .map(|(id, member)| Recipient::new(*id, member.name.clone(), member.channel.clone()))
    }

    /// 登録中の表示名一覧（名前順）
    pub async fn snapshot_names(&self) -> Vec<DisplayName> {
        let members = self.members.lock().await;
        let mut names: Vec<DisplayName> = members.values().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// 条件に合う受信者をロック内で選定する
    pub async fn select<F>(&self, predicate: F) -> Vec<Recipient>
    where
        F: Fn(&DisplayName) -> bool,
    {
        let members = self.members.lock().await;
        members
            .iter()
            .filter(|(_, member)| predicate(&member.name))
            .map(|(id, member)| Recipient::new(*id, member.name.clone(), member.channel.clone()))
            .collect()
    }

    /// 全接続
    pub async fn all(&self) -> Vec<Recipient> {
        self.select(|_| true).await
    }
}
