//! nodegate: an authenticating HTTP and WebSocket gateway in front of a
//! payment node's control API.

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod channel;
pub mod cli;
pub mod login;
pub mod routes;
pub mod state;
pub mod transport;
pub mod watch;
