//! Snapshot encoding and storage.
//!
//! A snapshot lets a host skip the full reindex at startup. The engine turns
//! its state into an opaque blob; a [`SnapshotStore`] keeps that blob
//! somewhere durable.
//!
//! ## Blob Format
//!
//! ```text
//! [Header]
//!   - Magic: "QSNP" (4 bytes)
//!   - Version: u32 LE
//!   - CRC32 of payload: u32 LE
//!   - Fingerprint length: u32 LE
//!   - Fingerprint: UTF-8 bytes
//!
//! [Payload]
//!   - LZ4 block (size-prepended) of the bincode-encoded index
//! ```
//!
//! The fingerprint names the tokenizer settings the index was built with. A
//! snapshot whose fingerprint differs from the running configuration is
//! rejected, because its terms would not line up with new queries.

use crate::error::{QuarryError, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Magic bytes at the start of every snapshot
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"QSNP";
/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

const FIXED_HEADER_LEN: usize = 16;

/// Encode `payload` into a snapshot blob tagged with `fingerprint`.
pub fn encode_snapshot<T: Serialize>(fingerprint: &str, payload: &T) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(payload)?;
    let compressed = lz4_flex::compress_prepend_size(&bytes);
    let checksum = crc32fast::hash(&compressed);

    let mut blob =
        Vec::with_capacity(FIXED_HEADER_LEN + fingerprint.len() + compressed.len());
    blob.extend_from_slice(SNAPSHOT_MAGIC);
    blob.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    blob.extend_from_slice(&checksum.to_le_bytes());
    blob.extend_from_slice(&(fingerprint.len() as u32).to_le_bytes());
    blob.extend_from_slice(fingerprint.as_bytes());
    blob.extend_from_slice(&compressed);

    debug!(
        raw_bytes = bytes.len(),
        blob_bytes = blob.len(),
        "Encoded snapshot"
    );
    Ok(blob)
}

/// Decode a snapshot blob, checking it against the expected fingerprint.
///
/// Every mismatch is reported as [`QuarryError::SnapshotIncompatible`].
pub fn decode_snapshot<T: DeserializeOwned>(blob: &[u8], fingerprint: &str) -> Result<T> {
    if blob.len() < FIXED_HEADER_LEN {
        return Err(QuarryError::snapshot("blob is shorter than the header"));
    }
    if &blob[0..4] != SNAPSHOT_MAGIC {
        return Err(QuarryError::snapshot("invalid magic bytes"));
    }

    let version = read_u32(blob, 4);
    if version != SNAPSHOT_VERSION {
        return Err(QuarryError::snapshot(format!(
            "format version {} (expected {})",
            version, SNAPSHOT_VERSION
        )));
    }

    let checksum = read_u32(blob, 8);
    let fingerprint_len = read_u32(blob, 12) as usize;
    let payload_start = FIXED_HEADER_LEN + fingerprint_len;
    if blob.len() < payload_start {
        return Err(QuarryError::snapshot("truncated fingerprint"));
    }

    let stored = std::str::from_utf8(&blob[FIXED_HEADER_LEN..payload_start])
        .map_err(|_| QuarryError::snapshot("fingerprint is not UTF-8"))?;
    if stored != fingerprint {
        return Err(QuarryError::snapshot(format!(
            "built with tokenizer settings {} (running {})",
            stored, fingerprint
        )));
    }

    let compressed = &blob[payload_start..];
    if crc32fast::hash(compressed) != checksum {
        return Err(QuarryError::snapshot("checksum mismatch"));
    }

    let bytes = lz4_flex::decompress_size_prepended(compressed)
        .map_err(|e| QuarryError::snapshot(format!("decompression failed: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| QuarryError::snapshot(format!("payload decode failed: {}", e)))
}

fn read_u32(blob: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&blob[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Durable storage for one snapshot blob.
pub trait SnapshotStore: Send + Sync {
    /// Load the stored blob, `None` if nothing was saved yet
    fn load_snapshot(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored blob
    fn save_snapshot(&self, blob: &[u8]) -> Result<()>;

    /// Remove everything this store has written
    fn clear(&self) -> Result<()>;
}

/// Stores the snapshot as a file in a data directory.
///
/// Writes go to a temp file first and are renamed into place; the previous
/// snapshot is kept as a single backup.
pub struct FileSnapshotStore {
    base_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        FileSnapshotStore {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Path to the current snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.base_dir.join("quarry.snap")
    }

    fn backup_path(&self) -> PathBuf {
        self.base_dir.join("quarry.snap.bak")
    }

    fn temp_path(&self) -> PathBuf {
        self.base_dir.join("quarry.snap.tmp")
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    /// Size of the current snapshot on disk, if any.
    pub fn size_on_disk(&self) -> Option<u64> {
        fs::metadata(self.snapshot_path()).ok().map(|m| m.len())
    }

    /// Copy the backup over the current snapshot and return its contents.
    pub fn restore_from_backup(&self) -> Result<Option<Vec<u8>>> {
        let backup_path = self.backup_path();
        if !backup_path.exists() {
            return Ok(None);
        }
        fs::copy(&backup_path, self.snapshot_path())?;
        warn!(path = %backup_path.display(), "Restored snapshot from backup");
        Ok(Some(fs::read(backup_path)?))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load_snapshot(&self) -> Result<Option<Vec<u8>>> {
        let path = self.snapshot_path();
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot on disk");
            return Ok(None);
        }

        let blob = fs::read(&path)?;
        info!(path = %path.display(), bytes = blob.len(), "Loaded snapshot");
        Ok(Some(blob))
    }

    fn save_snapshot(&self, blob: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, blob)?;

        let snapshot_path = self.snapshot_path();
        let backup_path = self.backup_path();
        if snapshot_path.exists() {
            let _ = fs::remove_file(&backup_path);
            let _ = fs::rename(&snapshot_path, &backup_path);
        }

        fs::rename(&temp_path, &snapshot_path)?;
        info!(path = %snapshot_path.display(), bytes = blob.len(), "Saved snapshot");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for path in [self.snapshot_path(), self.backup_path(), self.temp_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        info!(dir = %self.base_dir.display(), "Cleared snapshot files");
        Ok(())
    }
}

/// Keeps the snapshot in memory; for embedding hosts and tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    blob: RwLock<Option<Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_snapshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.read().clone())
    }

    fn save_snapshot(&self, blob: &[u8]) -> Result<()> {
        *self.blob.write() = Some(blob.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.blob.write() = None;
        Ok(())
    }
}
