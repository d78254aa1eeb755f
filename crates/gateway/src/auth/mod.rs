//! Basic-auth credential tiers and the protected-path gate.

pub mod credentials;
pub mod gate;

pub use credentials::CredentialStore;
pub use gate::{parse_basic, AccessDecision, BasicAuthGate, ProtectedPathSet};
