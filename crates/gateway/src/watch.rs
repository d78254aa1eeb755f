//! Backend connectivity watch.
//!
//! Probes the node periodically.  On every online/offline transition the
//! shared [`BackendStatus`] is updated and a `status` event is published.
//! Going offline force-closes every open channel with
//! `backend_unavailable`; while offline, probes back off exponentially.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ng_backend::{BackendClient, Backoff, EventHub};
use ng_domain::trace::TraceEvent;
use ng_protocol::{BackendEvent, CloseReason, Topic};

use crate::channel::ChannelRegistry;
use crate::state::{AppState, BackendStatus};

pub struct ConnectivityWatch {
    backend: Arc<dyn BackendClient>,
    hub: Arc<EventHub>,
    channels: Arc<ChannelRegistry>,
    status: Arc<RwLock<BackendStatus>>,
    interval: Duration,
    backoff: Backoff,
}

impl ConnectivityWatch {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            backend: state.backend.clone(),
            hub: state.hub.clone(),
            channels: state.channels.clone(),
            status: state.backend_status.clone(),
            interval: Duration::from_secs(state.config.backend.ping_interval_secs.max(1)),
            backoff: Backoff::default(),
        }
    }

    /// Probe once, record the outcome and return how long to wait before
    /// the next probe.
    pub async fn probe(&mut self) -> Duration {
        let outcome = self.backend.ping().await;
        let online = outcome.is_ok();

        let previous = {
            let mut status = self.status.write();
            let previous = status.online;
            status.online = Some(online);
            status.last_checked = Some(Utc::now());
            status.last_error = outcome.as_ref().err().map(|e| e.to_string());
            previous
        };

        if previous != Some(online) {
            self.on_transition(online, outcome.err().map(|e| e.to_string()));
        }

        if online {
            self.backoff.reset();
            self.interval
        } else {
            self.backoff.next_delay()
        }
    }

    fn on_transition(&self, online: bool, error: Option<String>) {
        let forced_closes = if online {
            tracing::info!("backend reachable");
            0
        } else {
            tracing::warn!(error = ?error, "backend unreachable");
            self.channels.close_all(CloseReason::BackendUnavailable)
        };

        TraceEvent::BackendConnectivity {
            online,
            forced_closes,
        }
        .emit();

        self.hub.publish(BackendEvent::new(
            Topic::Status,
            json!({ "online": online, "error": error }),
        ));
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let delay = self.probe().await;
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("connectivity watch stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use ng_backend::BackendError;
    use ng_protocol::Role;
    use serde_json::Value;

    use super::*;

    struct Switch(AtomicBool);

    #[async_trait]
    impl BackendClient for Switch {
        async fn call(&self, _method: &str, _params: Value) -> Result<Value, BackendError> {
            Ok(Value::Null)
        }
        async fn ping(&self) -> Result<(), BackendError> {
            if self.0.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BackendError::Unavailable("refused".into()))
            }
        }
    }

    fn watch(up: bool) -> (ConnectivityWatch, Arc<Switch>, Arc<ChannelRegistry>, Arc<EventHub>) {
        let backend = Arc::new(Switch(AtomicBool::new(up)));
        let hub = Arc::new(EventHub::new(16));
        let channels = Arc::new(ChannelRegistry::new());
        let w = ConnectivityWatch {
            backend: backend.clone(),
            hub: hub.clone(),
            channels: channels.clone(),
            status: Arc::new(RwLock::new(BackendStatus::default())),
            interval: Duration::from_secs(30),
            backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
        };
        (w, backend, channels, hub)
    }

    #[tokio::test]
    async fn going_offline_force_closes_channels() {
        let (mut w, backend, channels, hub) = watch(true);
        let mut sub = hub.subscribe();
        let rx = channels.register("c1", Role::Full);

        assert_eq!(w.probe().await, Duration::from_secs(30));
        assert_eq!(sub.recv().await.unwrap().payload["online"], true);

        backend.0.store(false, Ordering::SeqCst);
        let delay = w.probe().await;
        assert!(delay >= Duration::from_millis(100) && delay < Duration::from_secs(30));
        assert_eq!(rx.await.unwrap(), CloseReason::BackendUnavailable);

        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.topic, Topic::Status);
        assert_eq!(ev.payload["online"], false);
        assert_eq!(w.status.read().online, Some(false));
        assert!(w.status.read().last_error.is_some());
    }

    #[tokio::test]
    async fn backoff_grows_while_offline_and_resets() {
        let (mut w, backend, _, _) = watch(false);
        w.probe().await;
        w.probe().await;
        assert_eq!(w.backoff.attempt(), 2);

        backend.0.store(true, Ordering::SeqCst);
        assert_eq!(w.probe().await, Duration::from_secs(30));
        assert_eq!(w.backoff.attempt(), 0);
    }

    #[tokio::test]
    async fn steady_state_publishes_nothing() {
        let (mut w, _, _, hub) = watch(true);
        w.probe().await;
        let mut sub = hub.subscribe();
        w.probe().await;
        let got = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(got.is_err());
    }
}
