//! 再送用の履歴ミラー
//!
//! 直近 `capacity` 件のみを保持し、溢れた分は古い順に捨てる。

use std::collections::VecDeque;

use crate::domain::{Envelope, is_visible_to};

/// 新規接続に再送する履歴の件数
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
pub struct HistoryMirror {
    capacity: usize,
    records: VecDeque<Envelope>,
}

impl Default for HistoryMirror {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryMirror {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 1 件追加する。容量を超えた場合は最も古いレコードを返す。
    pub fn push(&mut self, envelope: Envelope) -> Option<Envelope> {
        if self.capacity == 0 {
            return Some(envelope);
        }
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(envelope);
        evicted
    }

    /// `viewer` に再送してよいレコードを古い順に返す
    pub fn visible_to(&self, viewer: &str) -> Vec<Envelope> {
        self.records
            .iter()
            .filter(|e| is_visible_to(&e.kind, &e.sender, viewer))
            .cloned()
            .collect()
    }

    /// ID でレコードを探す（新しいものから）
    pub fn find_by_id(&self, id: &str) -> Option<&Envelope> {
        self.records
            .iter()
            .rev()
            .find(|e| e.id.as_deref() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Kind;

    fn message(n: usize) -> Envelope {
        Envelope {
            id: Some(format!("m-{}", n)),
            sender: "alice".to_string(),
            body: format!("message {}", n),
            color: None,
            timestamp: n as i64,
            kind: Kind::Message,
        }
    }

    #[test]
    fn test_push_keeps_most_recent_twenty() {
        // テスト項目: 25 件追加すると直近 20 件が古い順に残る
        // given (前提条件):
        let mut mirror = HistoryMirror::default();

        // when (操作):
        let evicted: Vec<Envelope> = (1..=25).filter_map(|n| mirror.push(message(n))).collect();

        // then (期待する結果):
        let bodies: Vec<String> = mirror
            .visible_to("anyone")
            .into_iter()
            .map(|e| e.body)
            .collect();
        let expected: Vec<String> = (6..=25).map(|n| format!("message {}", n)).collect();
        assert_eq!(bodies, expected);
        assert_eq!(evicted.len(), 5);
        assert_eq!(evicted[0].body, "message 1");
    }

    #[test]
    fn test_visible_to_filters_direct_and_excluded() {
        // テスト項目: 再送対象は閲覧者の権限でフィルタされる
        // given (前提条件):
        let mut mirror = HistoryMirror::new(10);
        mirror.push(message(1));
        mirror.push(Envelope {
            kind: Kind::Direct {
                target: "bob".to_string(),
            },
            ..message(2)
        });
        mirror.push(Envelope {
            kind: Kind::Excluded {
                excluded: "carol".to_string(),
            },
            ..message(3)
        });

        // when (操作):
        let for_bob: Vec<String> = mirror
            .visible_to("bob")
            .into_iter()
            .map(|e| e.body)
            .collect();
        let for_carol: Vec<String> = mirror
            .visible_to("carol")
            .into_iter()
            .map(|e| e.body)
            .collect();

        // then (期待する結果):
        assert_eq!(for_bob, vec!["message 1", "message 2", "message 3"]);
        assert_eq!(for_carol, vec!["message 1"]);
    }

    #[test]
    fn test_find_by_id() {
        // テスト項目: ID でレコードを探せる
        // given (前提条件):
        let mut mirror = HistoryMirror::default();
        mirror.push(message(1));
        mirror.push(message(2));

        // when (操作):
        let found = mirror.find_by_id("m-2");
        let missing = mirror.find_by_id("m-9");

        // then (期待する結果):
        assert_eq!(found.map(|e| e.timestamp), Some(2));
        assert!(missing.is_none());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        // テスト項目: 容量 0 のミラーは何も保持しない
        // given (前提条件):
        let mut mirror = HistoryMirror::new(0);

        // when (操作):
        let evicted = mirror.push(message(1));

        // then (期待する結果):
        assert!(mirror.visible_to("alice").is_empty());
        assert!(evicted.is_some());
    }
}
