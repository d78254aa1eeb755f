//! Login sessions for nodegate.
//!
//! Sessions are created after a successful delegated login and live in
//! process memory, keyed by an opaque signed token that the browser holds
//! in a cookie.

pub mod manager;
pub mod token;

pub use manager::{
    Identity, Session, SessionError, SessionManager, SessionSettings, MAX_SESSION_TTL,
};
pub use token::TokenSigner;
