//! Terminal client for the chatrelay server.

pub mod error;
pub mod formatter;
pub mod session;

pub use error::ClientError;
pub use session::{ClientConfig, run_client_session};
