/*
    snapshot.rs - Full scene snapshots on disk

    A snapshot holds every record, tombstones included, so a restarted
    replica still rejects stale deltas for deleted elements.

    Features:
    - Atomic snapshot creation (write to temp, then rename)
    - CRC32 checksum over the encoded body
    - Numbered snapshots with cleanup of old ones
    - Rehydration through the remote write path, so loading into a scene
      that already holds newer records never moves them backwards

    File layout: [crc32 of body: u32 LE][body: bincode(Snapshot)]
*/

use crate::metrics::Timer;
use crate::scene_store::crdt::Resolution;
use crate::scene_store::model::{Element, Timestamp};
use crate::scene_store::scene::Scene;
use crate::scene_store::store::errors::{StoreError, StoreResult};
use crate::tracing::snapshot::{trace_load, trace_save};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Version of the snapshot body layout
pub const SNAPSHOT_FORMAT: u8 = 1;

const CHECKSUM_LEN: usize = 4;

/// Snapshot metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Body layout version
    pub format: u8,

    /// Sequence number, also part of the file name
    pub sequence: u32,

    /// When the snapshot was taken
    pub created_at: Timestamp,

    pub element_count: usize,
    pub tombstone_count: usize,
}

/// Snapshot data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub elements: Vec<Element>,
}

/// Counts of a snapshot replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub applied: usize,
    pub merged: usize,
    pub rejected: usize,
}

impl LoadReport {
    fn count(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Applied => self.applied += 1,
            Resolution::Merged => self.merged += 1,
            Resolution::Rejected => self.rejected += 1,
        }
    }
}

/// Manages snapshots in one directory
#[derive(Debug)]
pub struct SnapshotManager {
    snapshots_dir: PathBuf,
    current_sequence: AtomicU32,
}

impl SnapshotManager {
    pub fn new(snapshots_dir: PathBuf) -> StoreResult<Self> {
        create_dir_all(&snapshots_dir)?;

        // Continue numbering after whatever is already there
        let latest = list_snapshots(&snapshots_dir)?.last().map(|(seq, _)| *seq).unwrap_or(0);

        Ok(SnapshotManager { snapshots_dir, current_sequence: AtomicU32::new(latest) })
    }

    /// Write every record of `scene` to a new snapshot file
    pub fn save(&self, scene: &Scene) -> StoreResult<SnapshotMetadata> {
        let records = scene.snapshot()?;
        self.save_records(&records)
    }

    /// Write `records` to a new snapshot file
    pub fn save_records(&self, records: &[Arc<Element>]) -> StoreResult<SnapshotMetadata> {
        let op = trace_save(&self.snapshots_dir, records.len());
        let timer = Timer::new("scene.snapshot.save_ms");
        let sequence = self.current_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let elements: Vec<Element> = records.iter().map(|r| Element::clone(r)).collect();
        let metadata = SnapshotMetadata {
            format: SNAPSHOT_FORMAT,
            sequence,
            created_at: Timestamp::now(),
            element_count: elements.len(),
            tombstone_count: elements.iter().filter(|e| e.deleted).count(),
        };

        let snapshot = Snapshot { metadata: metadata.clone(), elements };
        let body = bincode::serialize(&snapshot)?;
        let checksum = crc32fast::hash(&body);

        // Write to temporary file first
        let temp_path = self.snapshots_dir.join(format!("snapshot_{:010}.tmp", sequence));
        let mut file = File::create(&temp_path)?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        // Atomically rename to final name
        let final_path = self.snapshot_path(sequence);
        std::fs::rename(&temp_path, &final_path)?;

        info!(
            sequence,
            elements = metadata.element_count,
            tombstones = metadata.tombstone_count,
            bytes = body.len() + CHECKSUM_LEN,
            "snapshot saved"
        );
        timer.stop();
        op.complete();
        Ok(metadata)
    }

    /// Read the newest snapshot, if any
    pub fn load_latest(&self) -> StoreResult<Option<Snapshot>> {
        match list_snapshots(&self.snapshots_dir)?.pop() {
            Some((_, path)) => read_snapshot(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Replay the newest snapshot into `scene` through the remote write
    /// path. Without a snapshot nothing happens.
    pub fn load_into(&self, scene: &Scene) -> StoreResult<LoadReport> {
        let op = trace_load(&self.snapshots_dir);
        let timer = Timer::new("scene.snapshot.load_ms");
        let Some(snapshot) = self.load_latest()? else {
            debug!(dir = %self.snapshots_dir.display(), "no snapshot to load");
            return Ok(LoadReport::default());
        };

        let mut report = LoadReport::default();
        for element in snapshot.elements {
            report.count(scene.apply_remote(element)?);
        }

        info!(
            sequence = snapshot.metadata.sequence,
            applied = report.applied,
            merged = report.merged,
            rejected = report.rejected,
            "snapshot loaded"
        );
        timer.stop();
        op.complete();
        Ok(report)
    }

    /// Remove old snapshots, keeping only the `keep_count` most recent
    pub fn cleanup_old_snapshots(&self, keep_count: usize) -> StoreResult<usize> {
        let snapshots = list_snapshots(&self.snapshots_dir)?;
        if snapshots.len() <= keep_count {
            return Ok(0);
        }

        let remove = snapshots.len() - keep_count;
        for (_, path) in snapshots.iter().take(remove) {
            std::fs::remove_file(path)?;
        }
        debug!(removed = remove, "old snapshots removed");
        Ok(remove)
    }

    fn snapshot_path(&self, sequence: u32) -> PathBuf {
        self.snapshots_dir.join(format!("snapshot_{:010}.bin", sequence))
    }
}

/// Snapshot files in `dir`, oldest first
fn list_snapshots(dir: &Path) -> StoreResult<Vec<(u32, PathBuf)>> {
    let mut snapshots: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let sequence = name.strip_prefix("snapshot_")?.strip_suffix(".bin")?.parse().ok()?;
            Some((sequence, path))
        })
        .collect();

    snapshots.sort_by_key(|(sequence, _)| *sequence);
    Ok(snapshots)
}

fn read_snapshot(path: &Path) -> StoreResult<Snapshot> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    if data.len() < CHECKSUM_LEN {
        return Err(StoreError::CorruptedData(format!("{} is truncated", path.display())));
    }
    let (checksum, body) = data.split_at(CHECKSUM_LEN);
    let expected = u32::from_le_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
    if crc32fast::hash(body) != expected {
        return Err(StoreError::CorruptedData(format!("checksum mismatch in {}", path.display())));
    }

    let snapshot: Snapshot =
        bincode::deserialize(body).map_err(|e| StoreError::Deserialization(e.to_string()))?;
    if snapshot.metadata.format != SNAPSHOT_FORMAT {
        return Err(StoreError::UnsupportedFormat(snapshot.metadata.format));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::scene_store::model::{ElementId, ElementKind, Payload};
    use tempfile::tempdir;

    fn populated_scene() -> Scene {
        let scene = Scene::seeded(&Config::default(), 21);
        scene.create(ElementId::new("a"), ElementKind::Rectangle, Payload::new().with("x", 1)).unwrap();
        scene.create(ElementId::new("b"), ElementKind::Text, Payload::new().with("text", "hi")).unwrap();
        scene.delete(&ElementId::new("b")).unwrap();
        scene
    }

    #[test]
    fn test_load_latest_empty() {
        let dir = tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().to_path_buf()).unwrap();
        assert!(manager.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_save_keeps_tombstones() {
        let dir = tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().to_path_buf()).unwrap();

        let metadata = manager.save(&populated_scene()).unwrap();
        assert_eq!(metadata.sequence, 1);
        assert_eq!(metadata.element_count, 2);
        assert_eq!(metadata.tombstone_count, 1);

        let snapshot = manager.load_latest().unwrap().unwrap();
        assert_eq!(snapshot.elements.len(), 2);
    }

    #[test]
    fn test_load_into_fresh_scene() {
        let dir = tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().to_path_buf()).unwrap();
        let source = populated_scene();
        manager.save(&source).unwrap();

        let target = Scene::seeded(&Config::default(), 22);
        let report = manager.load_into(&target).unwrap();
        assert_eq!(report, LoadReport { applied: 2, merged: 0, rejected: 0 });
        assert_eq!(*target.get(&ElementId::new("b")).unwrap(), *source.get(&ElementId::new("b")).unwrap());
        assert!(!target.can_undo().unwrap());
    }

    #[test]
    fn test_load_never_moves_versions_backwards() {
        let dir = tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().to_path_buf()).unwrap();
        let scene = populated_scene();
        manager.save(&scene).unwrap();

        scene.update(&ElementId::new("a"), |p| p.set("x", 99)).unwrap();
        let report = manager.load_into(&scene).unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(report.merged, 1);
        assert_eq!(scene.get(&ElementId::new("a")).unwrap().version, 2);
    }

    #[test]
    fn test_corruption_is_detected() {
        let dir = tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().to_path_buf()).unwrap();
        manager.save(&populated_scene()).unwrap();

        let path = manager.snapshot_path(1);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(manager.load_latest(), Err(StoreError::CorruptedData(_))));
    }

    #[test]
    fn test_cleanup_keeps_most_recent() {
        let dir = tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().to_path_buf()).unwrap();
        let scene = populated_scene();
        for _ in 0..4 {
            manager.save(&scene).unwrap();
        }

        assert_eq!(manager.cleanup_old_snapshots(2).unwrap(), 2);
        let remaining = list_snapshots(dir.path()).unwrap();
        let sequences: Vec<u32> = remaining.iter().map(|(s, _)| *s).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[test]
    fn test_sequence_continues_after_restart() {
        let dir = tempdir().unwrap();
        SnapshotManager::new(dir.path().to_path_buf()).unwrap().save(&populated_scene()).unwrap();

        let reopened = SnapshotManager::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.save(&populated_scene()).unwrap().sequence, 2);
    }
}
