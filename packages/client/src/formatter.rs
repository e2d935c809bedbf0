//! Message formatting utilities for client display.

use chatrelay_shared::{
    message::{ChatMessage, MessageType},
    time::format_clock_time,
};

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a received record for display
    ///
    /// # Arguments
    ///
    /// * `message` - The received record
    /// * `me` - The current user's name (to mark own messages)
    ///
    /// # Returns
    ///
    /// The text to print, or `None` when nothing should be shown
    pub fn format(message: &ChatMessage, me: &str) -> Option<String> {
        let time = format_clock_time(message.timestamp);
        let sender = Self::sender_label(message, me);
        let line = match message.r#type {
            MessageType::System => format!("\n[{}] * {}\n", time, message.message),
            MessageType::Join => format!("\n[{}] + {}\n", time, message.message),
            MessageType::Leave => format!("\n[{}] - {}\n", time, message.message),
            MessageType::Message => format!("\n[{}] {}: {}\n", time, sender, message.message),
            MessageType::Direct => format!(
                "\n[{}] {} -> {} (private): {}\n",
                time,
                sender,
                message.target_user.as_deref().unwrap_or("?"),
                message.message
            ),
            MessageType::Excluded => format!(
                "\n[{}] {} (hidden from {}): {}\n",
                time,
                sender,
                message.excluded_user.as_deref().unwrap_or("?"),
                message.message
            ),
            MessageType::Typing => {
                if message.is_typing == Some(false) {
                    return None;
                }
                format!("\n{} is typing...\n", message.username)
            }
            MessageType::Ack => format!("\n(delivered to {})\n", message.username),
        };
        Some(line)
    }

    /// Sender name, colored when the record carries a known color and
    /// suffixed with "(me)" for own messages
    fn sender_label(message: &ChatMessage, me: &str) -> String {
        let name = match message.color.as_deref().and_then(ansi_code) {
            Some(code) => format!("\x1b[{}m{}\x1b[0m", code, message.username),
            None => message.username.clone(),
        };
        if message.username == me {
            format!("{} (me)", name)
        } else {
            name
        }
    }
}

fn ansi_code(color: &str) -> Option<u8> {
    let code = match color.to_ascii_lowercase().as_str() {
        "red" => 31,
        "green" => 32,
        "yellow" => 33,
        "blue" => 34,
        "magenta" => 35,
        "cyan" => 36,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message_from_other_user() {
        // テスト項目: 他のユーザーのメッセージが送信者名と本文でフォーマットされる
        // given (前提条件):
        let msg = ChatMessage::new(MessageType::Message, "bob", "Hello, world!");

        // when (操作):
        let result = MessageFormatter::format(&msg, "alice").unwrap();

        // then (期待する結果):
        assert!(result.contains("bob: Hello, world!"));
        assert!(!result.contains("(me)"));
    }

    #[test]
    fn test_format_direct_message_marks_me() {
        // テスト項目: 自分が送った direct には (me) と宛先が表示される
        // given (前提条件):
        let mut msg = ChatMessage::new(MessageType::Direct, "alice", "secret");
        msg.target_user = Some("bob".to_string());

        // when (操作):
        let result = MessageFormatter::format(&msg, "alice").unwrap();

        // then (期待する結果):
        assert!(result.contains("alice (me) -> bob (private): secret"));
    }

    #[test]
    fn test_format_excluded_message() {
        // テスト項目: excluded には除外されたユーザー名が表示される
        // given (前提条件):
        let mut msg = ChatMessage::new(MessageType::Excluded, "alice", "cake");
        msg.excluded_user = Some("bob".to_string());

        // when (操作):
        let result = MessageFormatter::format(&msg, "carol").unwrap();

        // then (期待する結果):
        assert!(result.contains("(hidden from bob): cake"));
    }

    #[test]
    fn test_format_presence_and_system() {
        // テスト項目: join / leave / system がそれぞれの記号で表示される
        // given (前提条件):
        let joined = ChatMessage::new(MessageType::Join, "bob", "bob has joined the chat");
        let left = ChatMessage::new(MessageType::Leave, "bob", "bob has left the chat");
        let system = ChatMessage::new(MessageType::System, "System", "Server is shutting down");

        // when (操作) / then (期待する結果):
        assert!(MessageFormatter::format(&joined, "alice").unwrap().contains("+ bob has joined"));
        assert!(MessageFormatter::format(&left, "alice").unwrap().contains("- bob has left"));
        assert!(
            MessageFormatter::format(&system, "alice")
                .unwrap()
                .contains("* Server is shutting down")
        );
    }

    #[test]
    fn test_format_typing_stopped_is_hidden() {
        // テスト項目: 入力終了の typing は表示しない
        // given (前提条件):
        let mut msg = ChatMessage::new(MessageType::Typing, "bob", "");
        msg.is_typing = Some(false);

        // when (操作):
        let result = MessageFormatter::format(&msg, "alice");

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_format_colored_sender() {
        // テスト項目: 既知の色が指定された送信者名は ANSI カラーで囲まれる
        // given (前提条件):
        let mut msg = ChatMessage::new(MessageType::Message, "bob", "hi");
        msg.color = Some("Green".to_string());

        // when (操作):
        let result = MessageFormatter::format(&msg, "alice").unwrap();

        // then (期待する結果):
        assert!(result.contains("\x1b[32mbob\x1b[0m: hi"));
    }
}
