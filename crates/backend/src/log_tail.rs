//! Follows the backend node's log file and publishes each new line.
//!
//! Every complete line becomes a `raw_log` event.  Lines in the node's
//! `<date> <time> [LVL] SUBSYS: message` format whose level is in the
//! configured set are also published as a parsed `log` event.
//!
//! The tailer starts at the current end of file, polls for growth, and
//! starts over from the beginning when the file shrinks (rotation or
//! truncation).

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use ng_protocol::{BackendEvent, Topic};

use crate::hub::EventHub;

/// A backend log line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: String,
    pub level: String,
    pub subsystem: String,
    pub message: String,
}

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\S+ \S+) \[([A-Z]{3})\] (\S+): (.*)$")
            .unwrap_or_else(|e| unreachable!("static log regex: {e}"))
    })
}

/// Parse one line.  Returns `None` for lines not in the node's format
/// (continuations, stack traces, blank lines).
pub fn parse_line(line: &str) -> Option<LogLine> {
    let caps = line_regex().captures(line)?;
    Some(LogLine {
        timestamp: caps[1].to_owned(),
        level: caps[2].to_owned(),
        subsystem: caps[3].to_owned(),
        message: caps[4].to_owned(),
    })
}

pub struct LogTailer {
    path: PathBuf,
    poll: Duration,
    levels: HashSet<String>,
    hub: Arc<EventHub>,
}

impl LogTailer {
    pub fn new(
        path: impl Into<PathBuf>,
        poll: Duration,
        levels: impl IntoIterator<Item = String>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            path: path.into(),
            poll,
            levels: levels.into_iter().collect(),
            hub,
        }
    }

    /// Run until `cancel` fires.  A missing file is not an error; the
    /// tailer waits for it to appear.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(path = %self.path.display(), "tailing backend log");

        let mut offset = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let mut pending = String::new();
        let mut interval = tokio::time::interval(self.poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.read_from(offset).await {
                Ok(Some((new_offset, chunk))) => {
                    if new_offset < offset {
                        tracing::info!(path = %self.path.display(), "backend log truncated, restarting");
                        pending.clear();
                    }
                    offset = new_offset;
                    pending.push_str(&chunk);
                    self.drain_lines(&mut pending);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), error = %e, "backend log not readable");
                }
            }
        }
        tracing::debug!("backend log tailer stopped");
    }

    /// Read whatever was appended since `offset`.  Returns the new offset
    /// and the text read, or `None` when nothing changed.
    async fn read_from(&self, offset: u64) -> std::io::Result<Option<(u64, String)>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        let start = if len < offset { 0 } else { offset };
        if len == start {
            return Ok((start != offset).then(|| (start, String::new())));
        }
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.take(len - start).read_to_end(&mut buf).await?;
        Ok(Some((start + buf.len() as u64, String::from_utf8_lossy(&buf).into_owned())))
    }

    fn drain_lines(&self, pending: &mut String) {
        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                self.publish_line(line);
            }
        }
    }

    fn publish_line(&self, line: &str) {
        self.hub
            .publish(BackendEvent::new(Topic::RawLog, json!({ "line": line })));

        if let Some(parsed) = parse_line(line) {
            if self.levels.contains(&parsed.level) {
                self.hub.publish(BackendEvent::new(
                    Topic::Log,
                    json!({
                        "timestamp": parsed.timestamp,
                        "level": parsed.level,
                        "subsystem": parsed.subsystem,
                        "message": parsed.message,
                    }),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_format() {
        let line = "2024-03-01 10:15:02.123 [INF] LTND: Version: 0.17.4-beta";
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.timestamp, "2024-03-01 10:15:02.123");
        assert_eq!(parsed.level, "INF");
        assert_eq!(parsed.subsystem, "LTND");
        assert_eq!(parsed.message, "Version: 0.17.4-beta");
    }

    #[test]
    fn rejects_other_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("goroutine 1 [running]:").is_none());
        assert!(parse_line("2024-03-01 10:15:02.123 [info] LTND: lower").is_none());
    }

    #[tokio::test]
    async fn partial_lines_wait_for_newline() {
        let hub = Arc::new(EventHub::new(16));
        let mut sub = hub.subscribe();
        let tailer = LogTailer::new("unused", Duration::from_millis(10), ["ERR".to_string()], hub);

        let mut pending = "2024-03-01 10:00:00.000 [ERR] RPCS: bo".to_string();
        tailer.drain_lines(&mut pending);
        assert!(!pending.is_empty());

        pending.push_str("om\n");
        tailer.drain_lines(&mut pending);
        assert!(pending.is_empty());

        let raw = sub.recv().await.unwrap();
        assert_eq!(raw.topic, Topic::RawLog);
        assert_eq!(raw.payload["line"], "2024-03-01 10:00:00.000 [ERR] RPCS: boom");
        let parsed = sub.recv().await.unwrap();
        assert_eq!(parsed.topic, Topic::Log);
        assert_eq!(parsed.payload["message"], "boom");
    }

    #[tokio::test]
    async fn levels_outside_set_only_go_raw() {
        let hub = Arc::new(EventHub::new(16));
        let tailer = LogTailer::new("unused", Duration::from_millis(10), ["ERR".to_string()], hub.clone());
        let mut sub = hub.subscribe();
        let mut pending = "2024-03-01 10:00:00.000 [DBG] PEER: chatter\n".to_string();
        tailer.drain_lines(&mut pending);
        drop(tailer);
        drop(hub);

        assert_eq!(sub.recv().await.unwrap().topic, Topic::RawLog);
        assert!(sub.recv().await.is_none());
    }
}
