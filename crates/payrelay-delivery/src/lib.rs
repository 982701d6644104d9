pub mod connection;
pub mod engine;
pub mod registry;

pub use connection::{Connection, SendError};
pub use engine::{DeliveryEngine, DeliveryOutcome, RetryPolicy};
pub use registry::ConnectionRegistry;
