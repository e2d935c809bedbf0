//! Per-connection lifecycle handler.
//!
//! One task per accepted transport. The task owns the read half and drives the
//! state machine; a second task (`pusher_loop`) owns the write half and drains
//! the connection's outbox, so relayed records never wait on this task.

use std::{sync::Arc, time::Duration};

use chatrelay_shared::{
    codec::{CodecError, FrameCodec},
    message::{ChatMessage, MessageType},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

use crate::{
    config::ConnectionSettings,
    domain::{
        Command, ConnectionId, ConnectionState, DisplayName, HELP_TEXT, Outbound, PusherChannel,
        parse_command,
    },
    usecase::{JoinError, RouteError, RoutingEngine},
};

/// Whether the active loop keeps reading after a record
enum Flow {
    Continue,
    Close,
}

/// Serve one client connection until it closes.
///
/// `peer` is only used for logging.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    engine: Arc<RoutingEngine>,
    settings: ConnectionSettings,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let codec = settings.codec;
    let id = ConnectionId::generate();
    let mut state = ConnectionState::Connecting;
    tracing::debug!("Connection {} from {} ({})", id, peer, state);

    state = transition(id, state, ConnectionState::AwaitingJoin);
    let first = match timeout(settings.idle_timeout, codec.read_message(&mut reader)).await {
        Ok(Ok(message)) => message,
        Ok(Err(CodecError::ConnectionClosed)) => {
            tracing::debug!("Connection {} from {} closed before joining", id, peer);
            return;
        }
        Ok(Err(CodecError::Io(e))) => {
            tracing::debug!("Connection {} from {} failed before joining: {}", id, peer, e);
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!("Rejecting connection {} from {}: {}", id, peer, e);
            reject(&mut writer, &codec, engine.notice(format!("Invalid handshake: {}", e))).await;
            return;
        }
        Err(_) => {
            tracing::info!("Connection {} from {} sent no join record in time", id, peer);
            return;
        }
    };

    let name = match handshake_name(&first) {
        Ok(name) => name,
        Err(reason) => {
            tracing::warn!("Rejecting connection {} from {}: {}", id, peer, reason);
            reject(&mut writer, &codec, engine.notice(reason)).await;
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = match engine.join(id, name.clone(), tx.clone()).await {
        Ok(outcome) => outcome,
        Err(JoinError::NameTaken(taken)) => {
            tracing::info!("Rejecting connection {} from {}: '{}' is taken", id, peer, taken);
            reject(
                &mut writer,
                &codec,
                engine.notice(format!("Username '{}' is already taken", taken)),
            )
            .await;
            return;
        }
    };
    state = transition(id, state, ConnectionState::Active);

    let online: Vec<&str> = outcome.online.iter().map(DisplayName::as_str).collect();
    let _ = tx.send(Outbound::Record(engine.notice(format!(
        "Welcome, {}! Online users ({}): {}. Type /help for commands",
        name,
        online.len(),
        online.join(", ")
    ))));

    let mut session = Session {
        id,
        name,
        engine,
        outbox: tx,
        state,
    };
    let mut writer_task = pusher_loop(rx, writer, codec, settings.write_timeout, session.id);
    let mut writer_done = false;

    loop {
        tokio::select! {
            read = timeout(settings.idle_timeout, codec.read_message(&mut reader)) => {
                let flow = match read {
                    Ok(Ok(message)) => session.handle_record(message).await,
                    Ok(Err(CodecError::ConnectionClosed)) => {
                        tracing::info!("'{}' disconnected", session.name);
                        Flow::Close
                    }
                    Ok(Err(CodecError::Io(e))) => {
                        tracing::info!("'{}' transport error: {}", session.name, e);
                        Flow::Close
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Protocol violation from '{}': {}", session.name, e);
                        session.notify(format!("Protocol error: {}. Closing connection", e));
                        Flow::Close
                    }
                    Err(_) => {
                        tracing::info!(
                            "'{}' idle for {:?}, closing",
                            session.name,
                            settings.idle_timeout
                        );
                        session.notify("Idle timeout, closing connection");
                        Flow::Close
                    }
                };
                if let Flow::Close = flow {
                    break;
                }
            }
            _ = &mut writer_task => {
                writer_done = true;
                tracing::debug!("Writer for '{}' stopped", session.name);
                break;
            }
        }
    }

    session
        .close(writer_task, writer_done, settings.close_grace)
        .await;
}

fn transition(id: ConnectionId, from: ConnectionState, to: ConnectionState) -> ConnectionState {
    debug_assert!(from.can_transition_to(to), "{} -> {}", from, to);
    tracing::trace!("Connection {}: {} -> {}", id, from, to);
    to
}

/// The first record must be a `join` carrying a valid display name.
fn handshake_name(first: &ChatMessage) -> Result<DisplayName, String> {
    if first.r#type != MessageType::Join {
        return Err(format!(
            "The first message must be a join, got {:?}",
            first.r#type
        ));
    }
    DisplayName::new(&first.username).map_err(|e| format!("Invalid username: {}", e))
}

/// Send one notice straight through the codec and close the transport.
async fn reject<W>(writer: &mut W, codec: &FrameCodec, notice: ChatMessage)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = codec.write_message(writer, &notice).await {
        tracing::debug!("Could not deliver rejection: {}", e);
    }
    let _ = writer.shutdown().await;
}

/// Spawns the writer task that drains the outbox into the transport.
///
/// Ends on `Outbound::Close`, when every sender is gone, on a write failure, or
/// when the peer leaves a write blocked for longer than `write_timeout`.
fn pusher_loop<W>(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut writer: W,
    codec: FrameCodec,
    write_timeout: Duration,
    id: ConnectionId,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let message = match outbound {
                Outbound::Record(message) => message,
                Outbound::Close => break,
            };
            match timeout(write_timeout, codec.write_message(&mut writer, &message)).await {
                Ok(Ok(())) => {}
                Ok(Err(
                    e @ (CodecError::MessageTooLarge { .. } | CodecError::MalformedMessage(_)),
                )) => {
                    tracing::warn!("Dropping outbound record for connection {}: {}", id, e);
                }
                Ok(Err(e)) => {
                    tracing::debug!("Write to connection {} failed: {}", id, e);
                    break;
                }
                Err(_) => {
                    tracing::info!(
                        "Connection {} did not accept writes for {:?}, dropping it",
                        id,
                        write_timeout
                    );
                    break;
                }
            }
        }
        let _ = timeout(write_timeout, writer.shutdown()).await;
    })
}

/// State of an `Active` connection
struct Session {
    id: ConnectionId,
    name: DisplayName,
    engine: Arc<RoutingEngine>,
    outbox: PusherChannel,
    state: ConnectionState,
}

impl Session {
    /// Queue a personal `system` notice (not persisted).
    fn notify(&self, body: impl Into<String>) {
        let _ = self.outbox.send(Outbound::Record(self.engine.notice(body)));
    }

    async fn handle_record(&self, message: ChatMessage) -> Flow {
        if message.r#type == MessageType::Message
            && let Some(command) = parse_command(&message.message)
        {
            return self.handle_command(command, message).await;
        }
        self.route(message).await;
        Flow::Continue
    }

    async fn handle_command(&self, command: Command, original: ChatMessage) -> Flow {
        tracing::debug!("'{}' ran {:?}", self.name, command);
        match command {
            Command::Quit => {
                self.notify("Goodbye!");
                return Flow::Close;
            }
            Command::Users => {
                let users = self.engine.users().await;
                let names: Vec<&str> = users.iter().map(DisplayName::as_str).collect();
                self.notify(format!(
                    "Online users ({}): {}",
                    names.len(),
                    names.join(", ")
                ));
            }
            Command::Help => self.notify(HELP_TEXT),
            Command::Direct { target, body } => {
                let mut message = rewrite(original, MessageType::Direct, body);
                message.target_user = Some(target);
                self.route(message).await;
            }
            Command::Exclude { excluded, body } => {
                let mut message = rewrite(original, MessageType::Excluded, body);
                message.excluded_user = Some(excluded);
                self.route(message).await;
            }
            Command::Usage(usage) => self.notify(format!("Usage: {}", usage)),
            Command::Unknown(word) => self.notify(format!(
                "Unknown command: /{}. Type /help for a list of commands",
                word
            )),
        }
        Flow::Continue
    }

    async fn route(&self, message: ChatMessage) {
        match self.engine.route(&self.name, message).await {
            Ok(_) => {}
            Err(RouteError::InvalidTarget(reason)) => self.notify(reason),
            Err(RouteError::Forbidden(kind)) => {
                tracing::warn!("Ignoring {:?} record from '{}'", kind, self.name);
            }
            Err(e @ (RouteError::TooLarge { .. } | RouteError::Unencodable(_))) => {
                self.notify(format!("Message not sent: {}", e));
            }
        }
    }

    /// Run the closing path once: unregister, broadcast `leave`, stop the writer.
    async fn close(&mut self, mut writer_task: JoinHandle<()>, writer_done: bool, grace: Duration) {
        if self.state.is_closing_or_closed() {
            return;
        }
        self.state = transition(self.id, self.state, ConnectionState::Closing);

        self.engine.leave(&self.id).await;
        let _ = self.outbox.send(Outbound::Close);

        if !writer_done && timeout(grace, &mut writer_task).await.is_err() {
            tracing::debug!("Writer for '{}' did not finish in time, aborting", self.name);
            writer_task.abort();
        }
        self.state = transition(self.id, self.state, ConnectionState::Closed);
        tracing::debug!("Connection {} ('{}') closed", self.id, self.name);
    }
}

/// A slash command's body resent as a routed record of `kind`.
fn rewrite(original: ChatMessage, kind: MessageType, body: String) -> ChatMessage {
    let mut message = ChatMessage::new(kind, original.username, body);
    message.id = original.id;
    message.color = original.color;
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{ConnectionRegistry, history::InMemoryHistoryStore};
    use chatrelay_shared::time::FixedClock;
    use tokio::io::DuplexStream;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ハンドシェイク（正常・名前重複・不正な最初のレコード）
    // - スラッシュコマンドのローカル処理
    // - アイドルタイムアウト、プロトコル違反、読まない相手での終了
    //
    // 【なぜこのテストが必要か】
    // - 終了経路がどれであってもレジストリから確実に削除され、leave が 1 回だけ届くこと
    // ========================================

    const FRAME_LIMIT: usize = 1024;

    fn engine() -> Arc<RoutingEngine> {
        Arc::new(
            RoutingEngine::new(
                Arc::new(ConnectionRegistry::new()),
                Arc::new(InMemoryHistoryStore::new()),
                Arc::new(FixedClock::new(0)),
                20,
            )
            .with_frame_limit(FRAME_LIMIT),
        )
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            codec: FrameCodec::new(FRAME_LIMIT),
            idle_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            close_grace: Duration::from_secs(1),
        }
    }

    fn spawn_handler_with_buffer(
        engine: &Arc<RoutingEngine>,
        settings: ConnectionSettings,
        buffer: usize,
    ) -> (DuplexStream, JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(buffer);
        let handle = tokio::spawn(handle_connection(
            server,
            "test".to_string(),
            engine.clone(),
            settings,
        ));
        (client, handle)
    }

    fn spawn_handler(
        engine: &Arc<RoutingEngine>,
        settings: ConnectionSettings,
    ) -> (DuplexStream, JoinHandle<()>) {
        spawn_handler_with_buffer(engine, settings, 64 * 1024)
    }

    async fn send(client: &mut DuplexStream, message: &ChatMessage) {
        FrameCodec::new(FRAME_LIMIT)
            .write_message(client, message)
            .await
            .unwrap();
    }

    async fn recv(client: &mut DuplexStream) -> Result<ChatMessage, CodecError> {
        FrameCodec::new(FRAME_LIMIT).read_message(client).await
    }

    fn join(name: &str) -> ChatMessage {
        ChatMessage::new(MessageType::Join, name, "")
    }

    fn say(name: &str, body: &str) -> ChatMessage {
        ChatMessage::new(MessageType::Message, name, body)
    }

    /// join を送り、再送された履歴を読み飛ばして歓迎メッセージまで進める
    async fn join_as(engine: &Arc<RoutingEngine>, name: &str) -> (DuplexStream, JoinHandle<()>) {
        let (mut client, handle) = spawn_handler(engine, settings());
        send(&mut client, &join(name)).await;
        loop {
            let msg = recv(&mut client).await.unwrap();
            if msg.r#type == MessageType::System && msg.message.starts_with("Welcome") {
                return (client, handle);
            }
        }
    }

    /// レジストリに直接登録した観測用の接続
    async fn join_watcher(engine: &Arc<RoutingEngine>) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        engine
            .join(ConnectionId::generate(), DisplayName::new("watcher").unwrap(), tx)
            .await
            .unwrap();
        rx
    }

    /// 観測用の接続に届いた `name` の leave の件数
    fn leaves_of(rx: &mut mpsc::UnboundedReceiver<Outbound>, name: &str) -> usize {
        let mut count = 0;
        while let Ok(outbound) = rx.try_recv() {
            if let Outbound::Record(msg) = outbound
                && msg.r#type == MessageType::Leave
                && msg.username == name
            {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_join_receives_welcome_and_quit_closes() {
        // テスト項目: join 後に歓迎メッセージが届き、/quit で接続が閉じてレジストリから消える
        // given (前提条件):
        let engine = engine();
        let (mut client, handle) = spawn_handler(&engine, settings());
        send(&mut client, &join("alice")).await;
        let welcome = recv(&mut client).await.unwrap();
        assert_eq!(welcome.r#type, MessageType::System);
        assert!(welcome.message.contains("Welcome, alice"));

        // when (操作):
        send(&mut client, &say("alice", "/quit")).await;

        // then (期待する結果):
        assert_eq!(recv(&mut client).await.unwrap().message, "Goodbye!");
        assert!(matches!(recv(&mut client).await, Err(CodecError::ConnectionClosed)));
        handle.await.unwrap();
        assert!(engine.users().await.is_empty());
    }

    #[tokio::test]
    async fn test_taken_name_is_rejected() {
        // テスト項目: 使用中の表示名での join は system の拒否レコードの後に閉じられる
        // given (前提条件):
        let engine = engine();
        let (tx, _rx) = mpsc::unbounded_channel();
        engine
            .join(ConnectionId::generate(), DisplayName::new("alice").unwrap(), tx)
            .await
            .unwrap();
        let (mut client, handle) = spawn_handler(&engine, settings());

        // when (操作):
        send(&mut client, &join("alice")).await;

        // then (期待する結果):
        let rejection = recv(&mut client).await.unwrap();
        assert_eq!(rejection.r#type, MessageType::System);
        assert!(rejection.message.contains("already taken"));
        assert!(matches!(recv(&mut client).await, Err(CodecError::ConnectionClosed)));
        handle.await.unwrap();
        assert_eq!(engine.users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_first_record_must_be_join() {
        // テスト項目: join 以外の最初のレコードは拒否され、何も登録されない
        // given (前提条件):
        let engine = engine();
        let (mut client, handle) = spawn_handler(&engine, settings());

        // when (操作):
        send(&mut client, &say("alice", "hi")).await;

        // then (期待する結果):
        let rejection = recv(&mut client).await.unwrap();
        assert_eq!(rejection.r#type, MessageType::System);
        assert!(matches!(recv(&mut client).await, Err(CodecError::ConnectionClosed)));
        handle.await.unwrap();
        assert!(engine.users().await.is_empty());
    }

    #[tokio::test]
    async fn test_users_and_unknown_commands_answer_locally() {
        // テスト項目: /users と未知のコマンドは送信者にのみ system で応答される
        // given (前提条件):
        let engine = engine();
        let (mut alice, _alice_handle) = join_as(&engine, "alice").await;
        let (mut bob, _bob_handle) = join_as(&engine, "bob").await;
        let joined = recv(&mut alice).await.unwrap();
        assert_eq!(joined.r#type, MessageType::Join);

        // when (操作):
        send(&mut alice, &say("alice", "/users")).await;
        let users = recv(&mut alice).await.unwrap();
        send(&mut alice, &say("alice", "/dance")).await;
        let unknown = recv(&mut alice).await.unwrap();
        send(&mut alice, &say("alice", "visible")).await;

        // then (期待する結果):
        assert_eq!(users.message, "Online users (2): alice, bob");
        assert!(unknown.message.contains("Unknown command: /dance"));
        // bob には通常メッセージだけが届く
        assert_eq!(recv(&mut bob).await.unwrap().message, "visible");
    }

    #[tokio::test]
    async fn test_msg_command_is_routed_as_direct() {
        // テスト項目: /msg bob hi は bob 宛ての direct として届く
        // given (前提条件):
        let engine = engine();
        let (mut alice, _a) = join_as(&engine, "alice").await;
        let (mut bob, _b) = join_as(&engine, "bob").await;

        // when (操作):
        send(&mut alice, &say("alice", "/msg bob hi")).await;

        // then (期待する結果):
        let direct = recv(&mut bob).await.unwrap();
        assert_eq!(direct.r#type, MessageType::Direct);
        assert_eq!(direct.username, "alice");
        assert_eq!(direct.target_user.as_deref(), Some("bob"));
        assert_eq!(direct.message, "hi");
    }

    #[tokio::test]
    async fn test_record_too_large_after_stamping_is_reported_to_sender() {
        // テスト項目: 上限内で受信したが配信時に上限を超えるレコードは誰にも届かず、
        //            送信者に system で通知され、接続は継続する
        // given (前提条件):
        let engine = engine();
        let (mut alice, _a) = join_as(&engine, "alice").await;
        let (mut bob, _b) = join_as(&engine, "bob").await;
        assert_eq!(recv(&mut alice).await.unwrap().r#type, MessageType::Join);

        // when (操作):
        send(&mut alice, &say("alice", &"x".repeat(940))).await;
        send(&mut alice, &say("alice", "small")).await;

        // then (期待する結果):
        let notice = recv(&mut alice).await.unwrap();
        assert_eq!(notice.r#type, MessageType::System);
        assert!(notice.message.starts_with("Message not sent"));
        assert_eq!(recv(&mut bob).await.unwrap().message, "small");
        assert_eq!(engine.users().await.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        // テスト項目: アイドルタイムアウトで接続が閉じられレジストリから削除される
        // given (前提条件):
        let engine = engine();
        let settings = ConnectionSettings {
            idle_timeout: Duration::from_millis(50),
            ..settings()
        };
        let (mut client, handle) = spawn_handler(&engine, settings);
        send(&mut client, &join("sleepy")).await;
        recv(&mut client).await.unwrap();

        // when (操作):
        let notice = recv(&mut client).await.unwrap();

        // then (期待する結果):
        assert!(notice.message.contains("Idle timeout"));
        assert!(matches!(recv(&mut client).await, Err(CodecError::ConnectionClosed)));
        handle.await.unwrap();
        assert!(engine.users().await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        // テスト項目: 上限を超える長さのフレームでプロトコルエラーとなり接続が閉じる
        // given (前提条件):
        let engine = engine();
        let (mut client, handle) = spawn_handler(&engine, settings());
        send(&mut client, &join("big")).await;
        recv(&mut client).await.unwrap();

        // when (操作):
        client
            .write_all(&(2 * 1024 * 1024u32).to_be_bytes())
            .await
            .unwrap();

        // then (期待する結果):
        let notice = recv(&mut client).await.unwrap();
        assert!(notice.message.contains("Protocol error"));
        assert!(matches!(recv(&mut client).await, Err(CodecError::ConnectionClosed)));
        handle.await.unwrap();
        assert!(engine.users().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_record_closes_active_connection() {
        // テスト項目: 参加後に JSON として不正な本文を送るとプロトコルエラーで閉じられ、
        //            他の接続に leave が 1 回だけ届く
        // given (前提条件):
        let engine = engine();
        let mut watcher = join_watcher(&engine).await;
        let (mut client, handle) = join_as(&engine, "broken").await;

        // when (操作):
        let body = b"{nope";
        client
            .write_all(&(body.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(body).await.unwrap();

        // then (期待する結果):
        let notice = recv(&mut client).await.unwrap();
        assert!(notice.message.contains("Protocol error"));
        assert!(matches!(recv(&mut client).await, Err(CodecError::ConnectionClosed)));
        handle.await.unwrap();
        assert_eq!(engine.users().await, vec![DisplayName::new("watcher").unwrap()]);
        assert_eq!(leaves_of(&mut watcher, "broken"), 1);
    }

    #[tokio::test]
    async fn test_peer_that_stops_reading_is_dropped() {
        // テスト項目: 配信を読まない接続は書き込みタイムアウトで閉じられ、
        //            レジストリから削除されて他の接続に leave が 1 回だけ届く
        // given (前提条件):
        let engine = engine();
        let mut watcher = join_watcher(&engine).await;
        let settings = ConnectionSettings {
            write_timeout: Duration::from_millis(100),
            ..settings()
        };
        let (mut client, handle) = spawn_handler_with_buffer(&engine, settings, 256);
        send(&mut client, &join("stalled")).await;
        loop {
            match watcher.recv().await {
                Some(Outbound::Record(msg)) if msg.r#type == MessageType::Join => break,
                Some(_) => continue,
                None => panic!("watcher channel closed"),
            }
        }

        // when (操作): client は一切読まずに接続を保持し続ける
        for _ in 0..20 {
            engine.broadcast_system("x".repeat(200)).await;
        }

        // then (期待する結果):
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("stalled connection was not closed")
            .unwrap();
        assert_eq!(engine.users().await, vec![DisplayName::new("watcher").unwrap()]);
        assert_eq!(leaves_of(&mut watcher, "stalled"), 1);
        drop(client);
    }
}
