//! # Subscriber Gateway
//!
//! Everything on the subscriber side of the process: the push envelope, the
//! registry of live subscribers, the bridge that carries broadcasts from the
//! link thread, the keepalive ticker, and the axum server.

pub mod bridge;
pub mod keepalive;
pub mod message;
pub mod registry;
pub mod server;

pub use bridge::{BridgeReceiver, BroadcastBridge};
pub use message::PushMessage;
pub use registry::{SubscriberId, SubscriberRegistry};
pub use server::{create_router, serve, GatewayState};
