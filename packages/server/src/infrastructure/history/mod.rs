//! 履歴の実装
//!
//! - `mirror`: 再送用のメモリ上の直近 N 件（FIFO で追い出し）
//! - `memory`: `HistoryStore` のインメモリ実装
//! - `jsonl`: `HistoryStore` の JSON Lines ファイル実装（追記のみ）

pub mod jsonl;
pub mod memory;
pub mod mirror;

pub use jsonl::JsonlHistoryStore;
pub use memory::InMemoryHistoryStore;
pub use mirror::{DEFAULT_HISTORY_CAPACITY, HistoryMirror};
