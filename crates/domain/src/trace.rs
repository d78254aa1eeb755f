use serde::Serialize;

/// Structured trace events emitted across the nodegate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        provider: String,
        subject: String,
        ttl_secs: u64,
    },
    SessionDestroyed {
        reason: String,
    },
    SessionsPruned {
        removed: usize,
        remaining: usize,
    },
    AuthChallenge {
        path: String,
        reason: String,
    },
    ChannelOpened {
        connection_id: String,
        role: String,
    },
    ChannelRejected {
        connection_id: String,
        reason: String,
    },
    ChannelClosed {
        connection_id: String,
        role: String,
        reason: String,
        open_secs: i64,
    },
    CommandForwarded {
        connection_id: String,
        method: String,
        ok: bool,
        duration_ms: u64,
    },
    BackendConnectivity {
        online: bool,
        forced_closes: usize,
    },
    LoginCompleted {
        provider: String,
        subject: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ng_event");
    }
}
