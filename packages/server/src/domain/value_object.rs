//! 値オブジェクト: 接続 ID と表示名

use std::fmt;

use uuid::Uuid;

use super::{SYSTEM_SENDER, error::ValueObjectError};

/// 表示名の最大文字数
pub const MAX_DISPLAY_NAME_CHARS: usize = 32;

/// プロセス内で一意な接続ハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 先頭 8 文字でログには十分
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// 表示名
///
/// 前後の空白を除去した上で、空でない・空白を含まない・32 文字以下であること。
/// `@name` / `!name` の解析が空白区切りのため、名前中の空白は許可しない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValueObjectError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(ValueObjectError::EmptyDisplayName);
        }
        if value.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(ValueObjectError::DisplayNameTooLong {
                max: MAX_DISPLAY_NAME_CHARS,
            });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(ValueObjectError::DisplayNameWhitespace);
        }
        if value.eq_ignore_ascii_case(SYSTEM_SENDER) {
            return Err(ValueObjectError::ReservedDisplayName(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for DisplayName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
