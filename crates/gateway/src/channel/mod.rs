//! Real-time channel: a WebSocket per client carrying JSON frames.
//!
//! Backend events fan out through the [`ng_backend::EventHub`]; each
//! connection holds one subscription and filters it by role.  Client
//! commands are forwarded to the backend and answered asynchronously.

pub mod bridge;
pub mod filter;
pub mod registry;

pub use bridge::{channel_ws, ChannelState};
pub use filter::VisibilityPolicy;
pub use registry::ChannelRegistry;
