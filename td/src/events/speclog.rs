//! Event Log — the bit-stable, per-task `events.jsonl` append log described
//! by the external interface contract (§6.3 in the design docs): one line
//! per event, `{sequence, ts, kind, payload}`, tolerant of a truncated
//! trailing line.
//!
//! This is distinct from [`super::EventLogger`], which persists the richer
//! internal [`super::TdEvent`] telemetry stream keyed by execution id for
//! live observability. `SpecEventLog` is the canonical on-disk record a
//! task carries in its spec directory; it outlives any single agent session.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::domain::{Event, EventKind};

/// Appends to one task's `events.jsonl`, assigning dense, gapless sequence
/// numbers by counting well-formed lines already on disk.
pub struct SpecEventLog {
    path: PathBuf,
    next_sequence: u64,
}

impl SpecEventLog {
    /// Open (or prepare to create) the event log for a task's spec directory.
    pub fn open(spec_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = spec_dir.as_ref().join("events.jsonl");
        let next_sequence = Self::count_lines(&path)?;
        Ok(Self { path, next_sequence })
    }

    fn count_lines(path: &Path) -> std::io::Result<u64> {
        match File::open(path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                let mut count = 0u64;
                for line in reader.lines() {
                    match line {
                        Ok(l) if serde_json::from_str::<Event>(&l).is_ok() => count += 1,
                        // A truncated trailing line is tolerated and not counted.
                        _ => break,
                    }
                }
                Ok(count)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Append an event, assigning it the next sequence number.
    pub fn append(&mut self, kind: EventKind, payload: Value) -> std::io::Result<Event> {
        let event = Event::new(self.next_sequence, kind, payload);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(&event).map_err(std::io::Error::other)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        self.next_sequence += 1;
        Ok(event)
    }

    /// Read all well-formed events currently on disk, tolerating a
    /// truncated trailing line.
    pub fn read_all(spec_dir: impl AsRef<Path>) -> std::io::Result<Vec<Event>> {
        let path = spec_dir.as_ref().join("events.jsonl");
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn sequence_numbers_are_dense_and_gapless() {
        let dir = tempdir().unwrap();
        let mut log = SpecEventLog::open(dir.path()).unwrap();

        for _ in 0..3 {
            log.append(EventKind::TaskEvent, serde_json::json!({})).unwrap();
        }

        let events = SpecEventLog::read_all(dir.path()).unwrap();
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn reopening_resumes_sequence_from_disk() {
        let dir = tempdir().unwrap();
        {
            let mut log = SpecEventLog::open(dir.path()).unwrap();
            log.append(EventKind::AgentSessionStart, serde_json::json!({})).unwrap();
            log.append(EventKind::AgentSessionEnd, serde_json::json!({})).unwrap();
        }
        let mut log = SpecEventLog::open(dir.path()).unwrap();
        let event = log.append(EventKind::PhaseCompleted, serde_json::json!({})).unwrap();
        assert_eq!(event.sequence, 2);
    }

    #[test]
    fn truncated_trailing_line_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            "{\"sequence\":0,\"timestamp\":\"2026-01-01T00:00:00Z\",\"kind\":\"TASK_EVENT\",\"payload\":{}}\n{\"sequence\":1,\"trunc",
        )
        .unwrap();

        let events = SpecEventLog::read_all(dir.path()).unwrap();
        assert_eq!(events.len(), 1);

        let mut log = SpecEventLog::open(dir.path()).unwrap();
        let event = log.append(EventKind::TaskEvent, serde_json::json!({})).unwrap();
        assert_eq!(event.sequence, 1);
    }
}
