//! Channel protocol: access roles, backend event topics, and the JSON
//! frames exchanged over the real-time WebSocket channel.
//!
//! Every frame is a JSON object tagged by `type`.  Clients send
//! [`ClientMessage`]s; the gateway answers with [`ServerMessage`]s.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Roles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Access level granted to a request or channel connection.
///
/// Ordered: `None < Limited < Full`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    None,
    Limited,
    Full,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::None => "none",
            Role::Limited => "limited",
            Role::Full => "full",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Topics & events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Class of backend event.  Visibility is decided per topic.
///
/// The gateway itself publishes `status`, `log`, `raw_log` and `command`.
/// The node-event topics (`invoice` through `transaction`) are published by
/// whatever feeds node notifications into `ng_backend::EventHub::publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Backend connectivity and node state.
    Status,
    Invoice,
    Payment,
    Channel,
    Peer,
    Transaction,
    /// Parsed backend log lines at the configured levels.
    Log,
    /// Every backend log line, verbatim.
    RawLog,
    /// Commands forwarded by any connection.
    Command,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Topic::Status,
        Topic::Invoice,
        Topic::Payment,
        Topic::Channel,
        Topic::Peer,
        Topic::Transaction,
        Topic::Log,
        Topic::RawLog,
        Topic::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Status => "status",
            Topic::Invoice => "invoice",
            Topic::Payment => "payment",
            Topic::Channel => "channel",
            Topic::Peer => "peer",
            Topic::Transaction => "transaction",
            Topic::Log => "log",
            Topic::RawLog => "raw_log",
            Topic::Command => "command",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown topic \"{}\"", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_owned()))
    }
}

/// An event originating from the backend (or from the gateway on the
/// backend's behalf, e.g. connectivity changes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEvent {
    pub topic: Topic,
    pub at: DateTime<Utc>,
    pub payload: Value,
}

impl BackendEvent {
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self {
            topic,
            at: Utc::now(),
            payload,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client → gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Forward a command to the backend.  The result arrives later as a
    /// `command_result` carrying the same `id`.
    Command {
        #[serde(default)]
        id: Option<String>,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Ping { timestamp: i64 },
}

/// Gateway → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once the connection is authorized and open.
    Welcome {
        connection_id: String,
        role: Role,
        topics: Vec<Topic>,
        gateway_version: String,
    },
    /// Authorization failed; the connection closes right after.
    Rejected { reason: String },
    Event {
        topic: Topic,
        at: DateTime<Utc>,
        payload: Value,
    },
    CommandResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        method: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The gateway is closing the connection.
    Closing { reason: CloseReason },
    Pong { timestamp: i64 },
}

/// Why a channel connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ClientDisconnect,
    IdleTimeout,
    BackendUnavailable,
    Shutdown,
    Unauthorized,
    /// The client stopped reading and its outbound queue filled up.
    SlowConsumer,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientDisconnect => "client_disconnect",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::BackendUnavailable => "backend_unavailable",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Unauthorized => "unauthorized",
            CloseReason::SlowConsumer => "slow_consumer",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered() {
        assert!(Role::None < Role::Limited);
        assert!(Role::Limited < Role::Full);
    }

    #[test]
    fn topic_names_parse_back() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert_eq!(
            "bogus".parse::<Topic>().unwrap_err(),
            UnknownTopic("bogus".into())
        );
    }

    #[test]
    fn topic_serde_matches_as_str() {
        let json = serde_json::to_string(&Topic::RawLog).unwrap();
        assert_eq!(json, "\"raw_log\"");
    }

    #[test]
    fn command_without_params_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"command","method":"getinfo"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Command {
                id: None,
                method: "getinfo".into(),
                params: Value::Null,
            }
        );
    }

    #[test]
    fn command_result_omits_empty_fields() {
        let msg = ServerMessage::CommandResult {
            id: None,
            method: "getinfo".into(),
            ok: true,
            result: Some(serde_json::json!({"alias": "n1"})),
            error: None,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "command_result");
        assert!(v.get("error").is_none());
        assert!(v.get("id").is_none());
    }

    #[test]
    fn closing_carries_snake_case_reason() {
        let v = serde_json::to_value(ServerMessage::Closing {
            reason: CloseReason::BackendUnavailable,
        })
        .unwrap();
        assert_eq!(v["reason"], "backend_unavailable");
    }
}
