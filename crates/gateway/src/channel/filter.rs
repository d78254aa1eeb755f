//! Role-scoped event visibility.
//!
//! Full connections see every topic and every field.  Limited connections
//! see only the configured topics (never `raw_log`), with the configured field names removed
//! at any depth of the payload.  Unauthenticated connections never reach
//! the open state, so they see nothing.

use std::collections::HashSet;

use serde_json::Value;

use ng_domain::config::ChannelConfig;
use ng_protocol::{BackendEvent, Role, Topic};

#[derive(Debug, Clone)]
pub struct VisibilityPolicy {
    limited_topics: HashSet<Topic>,
    redacted_fields: HashSet<String>,
    command_allowlist: Option<HashSet<String>>,
}

impl VisibilityPolicy {
    pub fn from_config(cfg: &ChannelConfig) -> Self {
        let mut limited_topics = HashSet::new();
        for name in &cfg.limited_topics {
            match name.parse::<Topic>() {
                Ok(topic) => {
                    limited_topics.insert(topic);
                }
                Err(e) => tracing::warn!(error = %e, "ignoring channel.limited_topics entry"),
            }
        }
        Self {
            limited_topics,
            redacted_fields: cfg.limited_redacted_fields.iter().cloned().collect(),
            command_allowlist: cfg
                .limited_command_allowlist
                .as_ref()
                .map(|list| list.iter().cloned().collect()),
        }
    }

    /// Topics delivered to a connection of `role`, in a stable order.
    pub fn topics_for(&self, role: Role) -> Vec<Topic> {
        Topic::ALL
            .into_iter()
            .filter(|t| self.topic_visible(role, *t))
            .collect()
    }

    pub fn topic_visible(&self, role: Role, topic: Topic) -> bool {
        match role {
            Role::Full => true,
            // The raw log stream is full-access only, whatever the config says.
            Role::Limited => topic != Topic::RawLog && self.limited_topics.contains(&topic),
            Role::None => false,
        }
    }

    /// The payload `role` may see for `event`, or `None` when the topic is
    /// hidden from that role.
    pub fn payload_for(&self, role: Role, event: &BackendEvent) -> Option<Value> {
        if !self.topic_visible(role, event.topic) {
            return None;
        }
        match role {
            Role::Full => Some(event.payload.clone()),
            _ => Some(self.redact(&event.payload)),
        }
    }

    /// Whether `role` may forward `method` to the backend.
    pub fn may_command(&self, role: Role, method: &str) -> bool {
        match role {
            Role::Full => true,
            Role::Limited => self
                .command_allowlist
                .as_ref()
                .map_or(true, |allowed| allowed.contains(method)),
            Role::None => false,
        }
    }

    fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(k, _)| !self.redacted_fields.contains(k.as_str()))
                    .map(|(k, v)| (k.clone(), self.redact(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> VisibilityPolicy {
        VisibilityPolicy::from_config(&ChannelConfig::default())
    }

    #[test]
    fn full_sees_everything_untouched() {
        let p = policy();
        let ev = BackendEvent::new(Topic::RawLog, json!({ "line": "x", "r_preimage": "ab" }));
        assert_eq!(p.payload_for(Role::Full, &ev), Some(ev.payload.clone()));
        assert_eq!(p.topics_for(Role::Full).len(), Topic::ALL.len());
    }

    #[test]
    fn limited_loses_full_only_topics() {
        let p = policy();
        for topic in [Topic::RawLog, Topic::Payment, Topic::Command, Topic::Peer] {
            let ev = BackendEvent::new(topic, json!({}));
            assert!(p.payload_for(Role::Limited, &ev).is_none(), "{topic}");
        }
        assert_eq!(
            p.topics_for(Role::Limited),
            vec![Topic::Status, Topic::Invoice, Topic::Log]
        );
    }

    #[test]
    fn limited_fields_are_stripped_at_any_depth() {
        let p = policy();
        let ev = BackendEvent::new(
            Topic::Invoice,
            json!({
                "value": 1000,
                "payment_request": "lnbc1...",
                "htlcs": [{ "amt": 1, "r_preimage": "ff" }],
                "node": { "identity_pubkey": "02ab", "alias": "n1" }
            }),
        );
        let seen = p.payload_for(Role::Limited, &ev).unwrap();
        assert_eq!(
            seen,
            json!({
                "value": 1000,
                "htlcs": [{ "amt": 1 }],
                "node": { "alias": "n1" }
            })
        );
    }

    #[test]
    fn none_sees_nothing() {
        let p = policy();
        let ev = BackendEvent::new(Topic::Status, json!({}));
        assert!(p.payload_for(Role::None, &ev).is_none());
        assert!(p.topics_for(Role::None).is_empty());
    }

    #[test]
    fn command_allowlist_only_binds_limited() {
        let mut cfg = ChannelConfig::default();
        assert!(VisibilityPolicy::from_config(&cfg).may_command(Role::Limited, "sendpayment"));

        cfg.limited_command_allowlist = Some(vec!["getinfo".into()]);
        let p = VisibilityPolicy::from_config(&cfg);
        assert!(p.may_command(Role::Limited, "getinfo"));
        assert!(!p.may_command(Role::Limited, "sendpayment"));
        assert!(p.may_command(Role::Full, "sendpayment"));
        assert!(!p.may_command(Role::None, "getinfo"));
    }

    #[test]
    fn raw_log_stays_hidden_even_when_configured() {
        let cfg = ChannelConfig {
            limited_topics: vec!["status".into(), "raw_log".into()],
            ..ChannelConfig::default()
        };
        let p = VisibilityPolicy::from_config(&cfg);
        assert!(!p.topic_visible(Role::Limited, Topic::RawLog));
        assert_eq!(p.topics_for(Role::Limited), vec![Topic::Status]);
        let ev = BackendEvent::new(Topic::RawLog, json!({ "line": "x" }));
        assert!(p.payload_for(Role::Limited, &ev).is_none());
    }

    #[test]
    fn unknown_topic_names_are_ignored() {
        let cfg = ChannelConfig {
            limited_topics: vec!["status".into(), "bogus".into()],
            ..ChannelConfig::default()
        };
        assert_eq!(
            VisibilityPolicy::from_config(&cfg).topics_for(Role::Limited),
            vec![Topic::Status]
        );
    }
}
