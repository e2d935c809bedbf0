//! Infrastructure layer: concrete registry and history stores.

pub mod history;
pub mod registry;

pub use registry::{ConnectionRegistry, Recipient};
