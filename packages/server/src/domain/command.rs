//! スラッシュコマンドの解析
//!
//! `/` で始まる本文はルーティングエンジンに渡さず、接続ハンドラがローカルに処理する。

use super::routing::split_name;

/// `/help` で表示するコマンド一覧
pub const HELP_TEXT: &str = "Commands: /users, /msg <user> <text>, /exclude <user> <text>, /quit, /help. \
Prefix a message with @user to send it privately or with !user to hide it from that user.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 接続を終了する（`/quit`, `/exit`）
    Quit,
    /// 接続中のユーザー一覧を返す
    Users,
    Help,
    /// `/msg <user> <text>`: direct に書き換える
    Direct { target: String, body: String },
    /// `/exclude <user> <text>`: excluded に書き換える
    Exclude { excluded: String, body: String },
    /// 引数が不足している
    Usage(&'static str),
    Unknown(String),
}

/// 本文をスラッシュコマンドとして解析する
///
/// `/` で始まらない本文は `None` を返す。
pub fn parse_command(body: &str) -> Option<Command> {
    let input = body.trim().strip_prefix('/')?;
    let (word, args) = match input.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (input, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Command::Quit,
        "users" | "who" => Command::Users,
        "help" => Command::Help,
        "msg" | "dm" => match split_name(args) {
            Some((target, body)) => Command::Direct {
                target: target.to_string(),
                body: body.to_string(),
            },
            None => Command::Usage("/msg <user> <text>"),
        },
        "exclude" => match split_name(args) {
            Some((excluded, body)) => Command::Exclude {
                excluded: excluded.to_string(),
                body: body.to_string(),
            },
            None => Command::Usage("/exclude <user> <text>"),
        },
        _ => Command::Unknown(word.to_string()),
    };
    Some(command)
}
