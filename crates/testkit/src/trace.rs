//! Per-tick trace records, the JSONL sink and the determinism digest.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use arena_core::{ConditionState, EntityId, MovementState, SimTick};
use glam::{Quat, Vec3};
use serde::Serialize;

/// Which peer observed a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Authoritative server.
    Server,
    /// Client by harness index.
    Client(usize),
}

/// One entity as one peer saw it at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    /// Harness tick.
    pub tick: SimTick,
    /// Observer.
    pub peer: Peer,
    /// Observed entity.
    pub entity: EntityId,
    /// Simulated (server) or rendered (client) position.
    pub position: [f32; 3],
    /// Simulated (server) or rendered (client) rotation, `xyzw`.
    pub rotation: [f32; 4],
    /// Movement axis.
    pub movement: &'static str,
    /// Condition axis.
    pub condition: &'static str,
    /// Length of the visual offset still being smoothed out.
    pub offset: f32,
}

impl TraceRecord {
    /// Build a record from a transform and state axes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tick: SimTick,
        peer: Peer,
        entity: EntityId,
        position: Vec3,
        rotation: Quat,
        movement: MovementState,
        condition: ConditionState,
        offset: f32,
    ) -> Self {
        Self {
            tick,
            peer,
            entity,
            position: position.to_array(),
            rotation: rotation.to_array(),
            movement: movement.as_str(),
            condition: condition.as_str(),
            offset,
        }
    }
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    file: File,
}

impl JsonlSink {
    /// Create a new sink at `path`, creating parent dirs if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create trace directory {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create trace file {}", path.display()))?;
        Ok(Self { file })
    }

    /// Append one record as a line.
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        Ok(())
    }
}

/// Running hash over every record of a run.
///
/// Two runs of the same scenario and seed produce the same hex digest.
#[derive(Debug, Clone, Default)]
pub struct TraceDigest {
    hasher: blake3::Hasher,
    records: u64,
}

impl TraceDigest {
    /// Empty digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the digest.
    pub fn update<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let bytes = serde_json::to_vec(record).context("Failed to serialize trace record")?;
        self.hasher.update(&bytes);
        self.records += 1;
        Ok(())
    }

    /// Number of records folded so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Hex digest of everything folded so far.
    pub fn hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: u32, x: f32) -> TraceRecord {
        TraceRecord::new(
            SimTick(tick),
            Peer::Client(0),
            1,
            Vec3::new(x, 0.0, 0.0),
            Quat::IDENTITY,
            MovementState::Running,
            ConditionState::Normal,
            0.0,
        )
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces/run.jsonl");
        let mut sink = JsonlSink::create(&path).expect("sink create");
        sink.write(&record(1, 0.5)).unwrap();
        sink.write(&record(2, 1.0)).unwrap();
        drop(sink);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"movement\":\"running\""));
        assert!(lines[1].contains("{\"client\":0}"));
    }

    #[test]
    fn digest_tracks_content_and_order() {
        let mut a = TraceDigest::new();
        let mut b = TraceDigest::new();
        for digest in [&mut a, &mut b] {
            digest.update(&record(1, 0.5)).unwrap();
            digest.update(&record(2, 1.0)).unwrap();
        }
        assert_eq!(a.hex(), b.hex());
        assert_eq!(a.records(), 2);

        let mut swapped = TraceDigest::new();
        swapped.update(&record(2, 1.0)).unwrap();
        swapped.update(&record(1, 0.5)).unwrap();
        assert_ne!(a.hex(), swapped.hex());
    }
}
