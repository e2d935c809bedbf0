//! UI layer: the TCP listener, per-connection handlers and signal handling.

pub mod handler;
pub mod server;
pub mod signal;

pub use server::Server;
