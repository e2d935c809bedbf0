//! Transport handlers.

pub mod connection;

pub use connection::handle_connection;
