//! A recorded-event replay source: stands in for the grabber/event-tap
//! collaborator that sits out of scope of this core, so the workspace has
//! something to drive the pipeline's inbound interface with end-to-end.
//! One JSON object per line: `{"device_id":1,"time_ns":0,
//! "event":{"type":"key_down","code_class":"key_code","0":57}}` — the
//! `event` field is `remap_core::event::InputEvent`'s own serde shape, not
//! a bespoke format.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use remap_core::{DeviceId, EventTimeStamp, InputEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::pipeline::Inbound;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayEntry {
    pub device_id: u32,
    pub time_ns: u64,
    pub event: InputEvent,
}

/// Loads every entry from a JSON-lines replay file. Blank lines and lines
/// starting with `#` are skipped so a replay file can carry comments.
pub fn load(path: &Path) -> Result<Vec<ReplayEntry>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading replay file {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: ReplayEntry = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed replay entry", path.display(), line_no + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Feeds `entries` to `tx` in order, sleeping between entries for the
/// recorded inter-event delay so the pipeline sees the same relative
/// timing the recording captured, then sends [`Inbound::Shutdown`] once
/// the replay is exhausted.
pub fn spawn_feed(entries: Vec<ReplayEntry>, tx: mpsc::Sender<Inbound>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut previous_ns: Option<u64> = None;
        for entry in entries {
            if let Some(previous) = previous_ns {
                let delta_ns = entry.time_ns.saturating_sub(previous);
                if delta_ns > 0 {
                    tokio::time::sleep(Duration::from_nanos(delta_ns)).await;
                }
            }
            previous_ns = Some(entry.time_ns);

            let message = Inbound::Event {
                device_id: DeviceId(entry.device_id),
                time: EventTimeStamp::from_nanoseconds(entry.time_ns),
                event: entry.event,
            };
            if tx.send(message).await.is_err() {
                warn!("pipeline worker dropped before replay finished");
                return;
            }
        }
        let _ = tx.send(Inbound::Shutdown).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.jsonl");
        std::fs::write(
            &path,
            "# a comment\n\n{\"device_id\":1,\"time_ns\":0,\"event\":{\"type\":\"device_ungrabbed\"}}\n",
        )
        .unwrap();
        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].device_id, 1);
    }

    #[test]
    fn malformed_entry_is_reported_with_its_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        let error = load(&path).unwrap_err();
        assert!(error.to_string().contains(":1:"));
    }
}
