//! Backup file format.
//!
//! Backups are point-in-time snapshots of every stored relation. The same
//! format is used by the `file` engine for its on-disk data file.
//!
//! ## Backup Format
//!
//! ```text
//! | magic (4) | version (2) | timestamp (8) | relation_count (4) | CBOR body | sha256 (32) |
//! ```
//!
//! Integers are little-endian. The body is a CBOR array of relation images.

use crate::error::{CoreError, CoreResult};
use crate::eval::Relations;
use crate::relation::Relation;
use crate::value::DataValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

/// Magic bytes for backup files.
const BACKUP_MAGIC: [u8; 4] = *b"QRBK";
/// Current backup format version.
const BACKUP_VERSION: u16 = 1;
/// Header size (magic + version + timestamp + relation_count).
const HEADER_SIZE: usize = 4 + 2 + 8 + 4;
/// Footer size (SHA-256 digest).
const FOOTER_SIZE: usize = 32;

/// Metadata about a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupMetadata {
    /// When the backup was created (Unix timestamp in milliseconds).
    pub timestamp: u64,
    /// Number of relations in the backup.
    pub relation_count: u32,
    /// Size of the backup data in bytes.
    pub size: usize,
}

#[derive(Serialize, Deserialize)]
struct RelationImage {
    name: String,
    keys: Vec<String>,
    values: Vec<String>,
    tuples: Vec<Vec<DataValue>>,
}

impl From<&Relation> for RelationImage {
    fn from(rel: &Relation) -> Self {
        Self {
            name: rel.name().to_string(),
            keys: rel.keys().to_vec(),
            values: rel.values().to_vec(),
            tuples: rel.tuples().collect(),
        }
    }
}

impl TryFrom<RelationImage> for Relation {
    type Error = CoreError;

    fn try_from(image: RelationImage) -> CoreResult<Self> {
        let mut rel = Relation::new(&image.name, image.keys, image.values)
            .map_err(|e| CoreError::invalid_format(e.to_string()))?;
        for tuple in image.tuples {
            if tuple.len() != rel.arity() {
                return Err(CoreError::invalid_format(format!(
                    "tuple of length {} in relation '{}' of arity {}",
                    tuple.len(),
                    rel.name(),
                    rel.arity()
                )));
            }
            rel.put(tuple);
        }
        Ok(rel)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Serializes relations into backup bytes.
pub fn encode(relations: &Relations) -> CoreResult<Vec<u8>> {
    let images: Vec<RelationImage> = relations.values().map(RelationImage::from).collect();
    let count = u32::try_from(images.len())
        .map_err(|_| CoreError::invalid_operation("too many relations to back up"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + FOOTER_SIZE);
    data.extend_from_slice(&BACKUP_MAGIC);
    data.extend_from_slice(&BACKUP_VERSION.to_le_bytes());
    data.extend_from_slice(&now_millis().to_le_bytes());
    data.extend_from_slice(&count.to_le_bytes());
    ciborium::into_writer(&images, &mut data)
        .map_err(|e| CoreError::invalid_format(format!("failed to encode backup: {e}")))?;

    let digest = Sha256::digest(&data);
    data.extend_from_slice(&digest);
    Ok(data)
}

fn read_header(data: &[u8]) -> CoreResult<BackupMetadata> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(CoreError::invalid_format("backup data too small"));
    }
    if data[0..4] != BACKUP_MAGIC {
        return Err(CoreError::invalid_format("invalid backup magic"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != BACKUP_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported backup version: {version}"
        )));
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&data[6..14]);
    let mut count = [0u8; 4];
    count.copy_from_slice(&data[14..18]);
    Ok(BackupMetadata {
        timestamp: u64::from_le_bytes(ts),
        relation_count: u32::from_le_bytes(count),
        size: data.len(),
    })
}

/// Reads backup metadata without decoding the body.
pub fn read_metadata(data: &[u8]) -> CoreResult<BackupMetadata> {
    read_header(data)
}

/// Decodes and verifies backup bytes.
pub fn decode(data: &[u8]) -> CoreResult<(BackupMetadata, Relations)> {
    let metadata = read_header(data)?;

    let body_end = data.len() - FOOTER_SIZE;
    let digest = Sha256::digest(&data[..body_end]);
    if digest.as_slice() != &data[body_end..] {
        return Err(CoreError::invalid_format("backup checksum mismatch"));
    }

    let images: Vec<RelationImage> = ciborium::from_reader(&data[HEADER_SIZE..body_end])
        .map_err(|e| CoreError::invalid_format(format!("failed to decode backup: {e}")))?;
    if images.len() != metadata.relation_count as usize {
        return Err(CoreError::invalid_format(format!(
            "relation count mismatch: expected {}, got {}",
            metadata.relation_count,
            images.len()
        )));
    }

    let mut relations = Relations::new();
    for image in images {
        let rel = Relation::try_from(image)?;
        if relations.contains_key(rel.name()) {
            return Err(CoreError::invalid_format(format!(
                "duplicate relation '{}' in backup",
                rel.name()
            )));
        }
        relations.insert(rel.name().to_string(), rel);
    }
    Ok((metadata, relations))
}

fn already_exists(path: &Path) -> CoreError {
    CoreError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("backup target already exists: {}", path.display()),
    ))
}

/// Writes `data` to a uniquely named temp file next to `path`.
///
/// The temp file is removed if it is dropped without being persisted.
fn write_temp(path: &Path, data: &[u8], sync: bool) -> CoreResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    if sync {
        temp.as_file().sync_all()?;
    }
    Ok(temp)
}

/// Writes `data` to `path` atomically, replacing any existing file.
pub fn write_atomic(path: &Path, data: &[u8], sync: bool) -> CoreResult<()> {
    write_temp(path, data, sync)?
        .persist(path)
        .map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

/// Writes a new backup file. Refuses to overwrite an existing file.
///
/// When several writers race for one path, exactly one succeeds.
pub fn write_file(path: &Path, relations: &Relations) -> CoreResult<BackupMetadata> {
    if path.exists() {
        return Err(already_exists(path));
    }
    let data = encode(relations)?;
    write_temp(path, &data, true)?
        .persist_noclobber(path)
        .map_err(|e| match e.error.kind() {
            std::io::ErrorKind::AlreadyExists => already_exists(path),
            _ => CoreError::Io(e.error),
        })?;
    read_metadata(&data)
}

/// Reads and verifies a backup file.
pub fn read_file(path: &Path) -> CoreResult<(BackupMetadata, Relations)> {
    let data = fs::read(path)?;
    decode(&data)
}
