//! UseCase layer: the routing engine that owns delivery decisions.

pub mod error;
pub mod routing;

pub use error::{JoinError, RouteError};
pub use routing::{Delivery, JoinOutcome, RoutingEngine};
