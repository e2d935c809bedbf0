//! TCP client session management.

use std::{io::Write, time::Duration};

use chatrelay_shared::{
    codec::{CodecError, FrameCodec},
    message::{ChatMessage, MessageType},
    time::now_millis,
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::{net::TcpStream, sync::mpsc, time::timeout};
use uuid::Uuid;

use super::{error::ClientError, formatter::MessageFormatter};

/// How long to wait for the server to close after `/quit`
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Connection settings for one session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub color: Option<String>,
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Print the input prompt again below a received record
fn redisplay_prompt(username: &str) {
    print!("{}> ", username);
    std::io::stdout().flush().ok();
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "/quit" | "/exit")
}

/// Run the TCP client session until `/quit`, end of input or connection loss
pub async fn run_client_session(config: &ClientConfig) -> Result<(), ClientError> {
    let stream = TcpStream::connect(config.addr())
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
    let (mut reader, mut writer) = stream.into_split();
    let codec = FrameCodec::default();

    let mut join = ChatMessage::new(MessageType::Join, config.username.as_str(), "")
        .with_timestamp(now_millis());
    join.color = config.color.clone();
    codec.write_message(&mut writer, &join).await?;

    tracing::info!("Connected to chat server at {}", config.addr());
    println!(
        "\nYou are '{}'. Type messages and press Enter to send. Type /help for commands, /quit to exit.\n",
        config.username
    );

    // Acks for received direct messages go out through the write task
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<ChatMessage>();

    // Spawn a task to handle incoming messages
    let me = config.username.clone();
    let mut read_task = tokio::spawn(async move {
        let mut welcomed = false;
        let mut last_notice = None;

        loop {
            let message = match codec.read_message(&mut reader).await {
                Ok(message) => message,
                Err(CodecError::ConnectionClosed) => break,
                Err(e) => return Err(ClientError::from(e)),
            };

            if message.r#type == MessageType::System && !welcomed {
                if message.message.starts_with("Welcome") {
                    welcomed = true;
                } else {
                    last_notice = Some(message.message.clone());
                }
            }

            // Replayed history arrives before the welcome and is not acknowledged
            if welcomed
                && message.r#type == MessageType::Direct
                && message.username != me
                && let Some(id) = &message.id
            {
                let mut ack = ChatMessage::new(MessageType::Ack, me.as_str(), "");
                ack.message_id = Some(id.clone());
                let _ = ack_tx.send(ack);
            }

            if let Some(formatted) = MessageFormatter::format(&message, &me) {
                print!("{}", formatted);
                redisplay_prompt(&me);
            }
        }

        if welcomed {
            tracing::info!("Server closed the connection");
            return Ok(());
        }
        match last_notice {
            Some(notice) if notice.contains("already taken") => Err(ClientError::NameTaken(me)),
            Some(notice) => Err(ClientError::Rejected(notice)),
            None => Err(ClientError::Rejected(
                "connection closed during handshake".to_string(),
            )),
        }
    });

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt = format!("{}> ", config.username);

    // Spawn a blocking thread for rustyline (synchronous readline)
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    // Spawn a task to send typed lines and acks to the server
    let username = config.username.clone();
    let color = config.color.clone();
    let mut write_task = tokio::spawn(async move {
        loop {
            let (message, quit) = tokio::select! {
                line = input_rx.recv() => {
                    // End of input leaves the chat like /quit
                    let line = line.unwrap_or_else(|| "/quit".to_string());
                    let quit = is_quit(&line);
                    let mut message =
                        ChatMessage::new(MessageType::Message, username.as_str(), line)
                            .with_id(Uuid::new_v4().to_string())
                            .with_timestamp(now_millis());
                    message.color = color.clone();
                    (message, quit)
                }
                Some(ack) = ack_rx.recv() => (ack, false),
            };

            codec.write_message(&mut writer, &message).await?;
            if quit {
                return Ok::<(), ClientError>(());
            }
        }
    });

    // If any one of the tasks completes, stop the other
    tokio::select! {
        read_result = &mut read_task => {
            write_task.abort();
            read_result.map_err(|e| ClientError::ConnectionError(e.to_string()))?
        }
        write_result = &mut write_task => {
            write_result.map_err(|e| ClientError::ConnectionError(e.to_string()))??;
            // Let the goodbye notice arrive before exiting
            match timeout(QUIT_GRACE, &mut read_task).await {
                Ok(read_result) => {
                    read_result.map_err(|e| ClientError::ConnectionError(e.to_string()))?
                }
                Err(_) => {
                    read_task.abort();
                    Ok(())
                }
            }
        }
    }
}
