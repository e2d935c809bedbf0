//! Shared building blocks for the chatrelay server and client.
//!
//! - `message`: the wire record exchanged in both directions
//! - `codec`: length-prefixed framing of those records over a byte stream
//! - `time`: timestamps and a clock abstraction
//! - `logger`: tracing subscriber setup for the binaries

pub mod codec;
pub mod logger;
pub mod message;
pub mod time;
