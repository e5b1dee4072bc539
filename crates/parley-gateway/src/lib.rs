pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod persist;
pub mod protocol;
pub mod push;
pub mod registry;
pub mod router;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use dispatcher::{Gateway, GatewayConfig, GatewayDeps};
pub use protocol::Flow;
pub use registry::{SessionId, SessionState};
