//! Backend node collaborator: the command client, the event hub that fans
//! backend events out to channel connections, and the event sources fed
//! from the node (log tailing).

pub mod client;
pub mod hub;
pub mod log_tail;
pub mod reconnect;

pub use client::{BackendClient, BackendError, HttpBackend};
pub use hub::{EventHub, Subscription};
pub use log_tail::LogTailer;
pub use reconnect::Backoff;
