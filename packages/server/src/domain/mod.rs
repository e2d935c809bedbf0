//! Domain layer: value objects, the routing envelope, pure routing rules and
//! the traits implemented by the infrastructure layer.

pub mod command;
pub mod connection_state;
pub mod envelope;
pub mod error;
pub mod history;
pub mod pusher;
pub mod routing;
pub mod value_object;

pub use command::{Command, HELP_TEXT, parse_command};
pub use connection_state::ConnectionState;
pub use envelope::{Envelope, Kind, SYSTEM_SENDER};
pub use error::{EnvelopeError, HistoryError, PushError, RegistryError, ValueObjectError};
pub use history::{HistoryRecord, HistoryStore};
pub use pusher::{Outbound, PusherChannel};
pub use routing::{classify_body, is_recipient, is_visible_to, validate_target};
pub use value_object::{ConnectionId, DisplayName};

#[cfg(test)]
pub use history::MockHistoryStore;
