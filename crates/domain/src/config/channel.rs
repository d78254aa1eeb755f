use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Real-time channel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Real-time channel behaviour and the limited-tier visibility rules.
///
/// Full-access connections always receive every topic and every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// A connection with no inbound traffic for this long is closed.
    #[serde(default = "d_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Capacity of the backend event fan-out buffer.  Slow connections
    /// that fall further behind skip the oldest events.
    #[serde(default = "d_event_buffer")]
    pub event_buffer: usize,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "d_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Topic names a limited connection may observe.
    #[serde(default = "d_limited_topics")]
    pub limited_topics: Vec<String>,
    /// Payload keys stripped (at any depth) from events sent to limited
    /// connections.
    #[serde(default = "d_limited_redacted_fields")]
    pub limited_redacted_fields: Vec<String>,
    /// Backend log levels forwarded to limited connections as parsed
    /// `log` events.
    #[serde(default = "d_limited_log_levels")]
    pub limited_log_levels: Vec<String>,
    /// When set, limited connections may only forward these commands.
    /// `None` leaves command forwarding unrestricted for both tiers.
    #[serde(default)]
    pub limited_command_allowlist: Option<Vec<String>>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: d_idle_timeout_secs(),
            event_buffer: d_event_buffer(),
            outbound_buffer: d_outbound_buffer(),
            limited_topics: d_limited_topics(),
            limited_redacted_fields: d_limited_redacted_fields(),
            limited_log_levels: d_limited_log_levels(),
            limited_command_allowlist: None,
        }
    }
}

fn d_idle_timeout_secs() -> u64 {
    300
}
fn d_event_buffer() -> usize {
    256
}
fn d_outbound_buffer() -> usize {
    64
}
fn d_limited_topics() -> Vec<String> {
    vec!["status".into(), "invoice".into(), "log".into()]
}
fn d_limited_redacted_fields() -> Vec<String> {
    vec![
        "identity_pubkey".into(),
        "uris".into(),
        "payment_request".into(),
        "r_preimage".into(),
        "payment_preimage".into(),
    ]
}
fn d_limited_log_levels() -> Vec<String> {
    vec!["INF".into(), "WRN".into(), "ERR".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_never_sees_raw_log_by_default() {
        let cfg = ChannelConfig::default();
        assert!(!cfg.limited_topics.iter().any(|t| t == "raw_log"));
        assert!(cfg.limited_command_allowlist.is_none());
    }

    #[test]
    fn allowlist_parses() {
        let cfg: ChannelConfig =
            toml::from_str(r#"limited_command_allowlist = ["getinfo"]"#).unwrap();
        assert_eq!(cfg.limited_command_allowlist, Some(vec!["getinfo".to_string()]));
    }
}
