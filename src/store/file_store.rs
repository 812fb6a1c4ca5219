//! Single-file document store with an append-only version log
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("PUBVARDB")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - record_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE, 0 while unsynced writes exist)
//!   - document_count: 8 bytes (u64 LE)
//!   - reserved: 24 bytes
//!
//! [RECORDS: variable]
//!   - size: 4 bytes (u32 LE)
//!   - checksum: 8 bytes (BLAKE3 prefix of the payload)
//!   - payload: `size` bytes (see `Record::encode`)
//!
//! [INDEX: variable]
//!   - per document, sorted by id:
//!     id (32) + version_count (u32) + (offset u64, size u32) per version
//! ```
//!
//! When the header carries no index offset the records are scanned on open,
//! stopping at the first frame that fails its checksum.

use super::record::Record;
use super::{CreateOpts, DocumentStore};
use crate::model::{Content, Coordinate, Document, DocumentId, Metadata};
use crate::{Error, Result, FORMAT_VERSION, MAGIC};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const HEADER_SIZE: u64 = 64;
const FRAME_HEADER_SIZE: u64 = 12;
const INDEX_OFFSET_FIELD: u64 = 24;

/// Location of one record payload
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// In-memory index: document id → payload location of each version
struct Index {
    entries: HashMap<DocumentId, Vec<IndexEntry>>,
    record_count: u64,
}

impl Index {
    fn new() -> Self {
        Index {
            entries: HashMap::new(),
            record_count: 0,
        }
    }
}

/// File handle plus append position
struct Log {
    file: File,
    write_offset: u64,
    /// Records were appended since the last index write
    dirty: bool,
}

/// A versioned document store backed by a single file
pub struct FileStore {
    path: PathBuf,
    index: RwLock<Index>,
    log: RwLock<Log>,
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        info!(path = %path.display(), "created document store");

        Ok(FileStore {
            path,
            index: RwLock::new(Index::new()),
            log: RwLock::new(Log {
                file,
                write_offset: HEADER_SIZE,
                dirty: false,
            }),
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("File too short for header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = read_u32(&header[8..12]);
        if version != FORMAT_VERSION {
            return Err(Error::VersionMismatch {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        let record_count = read_u64(&header[16..24]);
        let index_offset = read_u64(&header[24..32]);
        let document_count = read_u64(&header[32..40]);

        let (index, write_offset) = if index_offset >= HEADER_SIZE {
            let index = load_index(&mut file, index_offset, document_count, record_count)?;
            (index, index_offset)
        } else {
            scan_records(&mut file)?
        };

        debug!(
            path = %path.display(),
            documents = index.entries.len(),
            records = index.record_count,
            "opened document store"
        );

        Ok(FileStore {
            path,
            index: RwLock::new(index),
            log: RwLock::new(Log {
                file,
                write_offset,
                dirty: index_offset < HEADER_SIZE,
            }),
        })
    }

    /// Open or create a store file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Number of distinct documents
    pub fn document_count(&self) -> usize {
        self.index.read().entries.len()
    }

    /// Total number of stored versions
    pub fn record_count(&self) -> u64 {
        self.index.read().record_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the index after the records and point the header at it
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let mut log = self.log.write();
        let write_offset = log.write_offset;

        let mut ids: Vec<_> = index.entries.keys().copied().collect();
        ids.sort();

        let mut buf = Vec::new();
        for id in &ids {
            let versions = &index.entries[id];
            buf.extend_from_slice(id.as_bytes());
            buf.extend_from_slice(&(versions.len() as u32).to_le_bytes());
            for entry in versions {
                buf.extend_from_slice(&entry.offset.to_le_bytes());
                buf.extend_from_slice(&entry.size.to_le_bytes());
            }
        }

        let file = &mut log.file;
        file.seek(SeekFrom::Start(write_offset))?;
        file.write_all(&buf)?;
        file.set_len(write_offset + buf.len() as u64)?;

        file.seek(SeekFrom::Start(16))?;
        file.write_all(&index.record_count.to_le_bytes())?;
        file.write_all(&write_offset.to_le_bytes())?;
        file.write_all(&(ids.len() as u64).to_le_bytes())?;
        file.sync_all()?;

        log.dirty = false;
        debug!(records = index.record_count, documents = ids.len(), "synced document store");
        Ok(())
    }

    /// Append one version to the log. Caller holds the index write lock.
    fn append(&self, index: &mut Index, document: &Document) -> Result<()> {
        let payload = Record::new(document.clone()).encode()?;
        let size = u32::try_from(payload.len())
            .map_err(|_| Error::Corruption(format!("Record for {} too large", document.id)))?;

        let offset = {
            let mut log = self.log.write();
            if !log.dirty {
                // The on-disk index is about to be overwritten by records
                log.file.seek(SeekFrom::Start(INDEX_OFFSET_FIELD))?;
                log.file.write_all(&0u64.to_le_bytes())?;
                log.dirty = true;
            }

            let start = log.write_offset;
            log.file.seek(SeekFrom::Start(start))?;
            log.file.write_all(&size.to_le_bytes())?;
            log.file.write_all(&Record::checksum(&payload))?;
            log.file.write_all(&payload)?;
            log.write_offset = start + FRAME_HEADER_SIZE + size as u64;
            start + FRAME_HEADER_SIZE
        };

        index
            .entries
            .entry(document.id)
            .or_default()
            .push(IndexEntry { offset, size });
        index.record_count += 1;
        Ok(())
    }

    fn read_entry(&self, entry: IndexEntry) -> Result<Document> {
        let mut log = self.log.write();
        log.file.seek(SeekFrom::Start(entry.offset))?;
        let mut data = vec![0u8; entry.size as usize];
        log.file.read_exact(&mut data)?;
        Ok(Record::decode(&data)?.document)
    }

    fn latest_entry(&self, id: &DocumentId) -> Result<IndexEntry> {
        let index = self.index.read();
        index
            .entries
            .get(id)
            .and_then(|versions| versions.last().copied())
            .ok_or_else(|| Error::NotFound(id.to_hex()))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn resolve_deterministic(
        &self,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document> {
        let id = coordinate.id();
        let mut index = self.index.write();
        let existing = index.entries.get(&id).and_then(|v| v.last().copied());
        if let Some(entry) = existing {
            drop(index);
            return self.read_entry(entry);
        }

        let doc = Document::genesis(
            id,
            Metadata::from_coordinate(coordinate, opts.pin),
            Content::new(),
        );
        self.append(&mut index, &doc)?;
        Ok(doc)
    }

    async fn create_new(
        &self,
        content: Content,
        coordinate: &Coordinate,
        opts: &CreateOpts,
    ) -> Result<Document> {
        let id = DocumentId::mint(coordinate.id().as_bytes());
        let doc = Document::genesis(id, Metadata::from_coordinate(coordinate, opts.pin), content);
        let mut index = self.index.write();
        self.append(&mut index, &doc)?;
        Ok(doc)
    }

    async fn load(&self, id: &DocumentId) -> Result<Document> {
        let entry = self.latest_entry(id)?;
        self.read_entry(entry)
    }

    async fn update(&self, id: &DocumentId, patch: Content) -> Result<Document> {
        let mut index = self.index.write();
        let entry = index
            .entries
            .get(id)
            .and_then(|versions| versions.last().copied())
            .ok_or_else(|| Error::NotFound(id.to_hex()))?;
        let next = self.read_entry(entry)?.next_version(patch);
        self.append(&mut index, &next)?;
        Ok(next)
    }

    async fn versions(&self, id: &DocumentId) -> Result<Vec<Document>> {
        let entries = {
            let index = self.index.read();
            index
                .entries
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_hex()))?
        };
        entries.into_iter().map(|e| self.read_entry(e)).collect()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        if let Err(e) = self.sync() {
            warn!(path = %self.path.display(), error = %e, "failed to sync document store on drop");
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(arr)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(arr)
}

fn load_index(file: &mut File, offset: u64, documents: u64, records: u64) -> Result<Index> {
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(offset))?;
    let mut index = Index::new();

    for _ in 0..documents {
        let mut head = [0u8; 36];
        file.read_exact(&mut head)?;
        let mut id_bytes = [0u8; 32];
        id_bytes.copy_from_slice(&head[0..32]);
        let count = read_u32(&head[32..36]);

        let remaining = len.saturating_sub(file.stream_position()?);
        if u64::from(count) * 12 > remaining {
            return Err(Error::Corruption(format!(
                "Index entry claims {} versions, only {} bytes left",
                count, remaining
            )));
        }

        let mut versions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut entry = [0u8; 12];
            file.read_exact(&mut entry)?;
            versions.push(IndexEntry {
                offset: read_u64(&entry[0..8]),
                size: read_u32(&entry[8..12]),
            });
        }
        index.record_count += versions.len() as u64;
        index.entries.insert(DocumentId::from_bytes(id_bytes), versions);
    }

    if index.record_count != records {
        return Err(Error::Corruption(format!(
            "Index lists {} records, header says {}",
            index.record_count, records
        )));
    }
    Ok(index)
}

/// Rebuild the index by walking every framed record after the header
fn scan_records(file: &mut File) -> Result<(Index, u64)> {
    let len = file.seek(SeekFrom::End(0))?;
    let mut index = Index::new();
    let mut pos = HEADER_SIZE;

    while pos + FRAME_HEADER_SIZE <= len {
        file.seek(SeekFrom::Start(pos))?;
        let mut frame = [0u8; FRAME_HEADER_SIZE as usize];
        file.read_exact(&mut frame)?;
        let size = read_u32(&frame[0..4]);
        let payload_offset = pos + FRAME_HEADER_SIZE;
        if payload_offset + size as u64 > len {
            break;
        }

        let mut payload = vec![0u8; size as usize];
        file.read_exact(&mut payload)?;
        if Record::checksum(&payload) != frame[4..12] {
            break;
        }
        let record = match Record::decode(&payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(offset = pos, error = %e, "stopping record scan at undecodable record");
                break;
            }
        };

        let versions = index.entries.entry(record.document.id).or_default();
        if record.document.version_count != versions.len() as u64 {
            warn!(
                offset = pos,
                id = %record.document.id.short(),
                "stopping record scan at out-of-sequence version"
            );
            break;
        }
        versions.push(IndexEntry {
            offset: payload_offset,
            size,
        });
        index.record_count += 1;
        pos = payload_offset + size as u64;
    }
    index.entries.retain(|_, versions| !versions.is_empty());

    if pos < len {
        warn!(discarded = len - pos, "ignoring trailing bytes after last valid record");
    }
    Ok((index, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content;
    use crate::model::Controller;
    use serde_json::json;
    use tempfile::tempdir;

    fn coordinate(tag: &str) -> Coordinate {
        Coordinate::new("test", Controller::new("me"), vec![tag.to_string()])
    }

    #[tokio::test]
    async fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vars.pubvar");

        {
            let store = FileStore::create(&path).unwrap();
            assert_eq!(store.document_count(), 0);
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.document_count(), 0);
            assert_eq!(store.record_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, vec![7u8; 128]).unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));
    }

    #[tokio::test]
    async fn test_rejects_oversized_index_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vars.pubvar");

        {
            let store = FileStore::create(&path).unwrap();
            store
                .resolve_deterministic(&coordinate("big"), &CreateOpts::local())
                .await
                .unwrap();
            store.sync().unwrap();
        }

        // Overwrite the version count of the only index entry
        let bytes = std::fs::read(&path).unwrap();
        let index_offset = read_u64(&bytes[INDEX_OFFSET_FIELD as usize..]);
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(index_offset + 32)).unwrap();
        file.write_all(&u32::MAX.to_le_bytes()).unwrap();
        drop(file);

        assert!(matches!(FileStore::open(&path), Err(Error::Corruption(_))));
    }

    #[tokio::test]
    async fn test_versions_persist_after_sync() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vars.pubvar");

        let id;
        {
            let store = FileStore::create(&path).unwrap();
            let doc = store
                .resolve_deterministic(&coordinate("a"), &CreateOpts::local())
                .await
                .unwrap();
            id = doc.id;
            store.update(&id, content! { "value" => "one" }).await.unwrap();
            store.update(&id, content! { "value" => "two" }).await.unwrap();
            store.sync().unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            let doc = store.load(&id).await.unwrap();
            assert_eq!(doc.version_count, 2);
            assert_eq!(doc.field("value"), Some(&json!("two")));
            assert_eq!(store.versions(&id).await.unwrap().len(), 3);

            let again = store
                .resolve_deterministic(&coordinate("a"), &CreateOpts::local())
                .await
                .unwrap();
            assert_eq!(again.version_count, 2);
            assert_eq!(store.record_count(), 3);
        }
    }

    #[tokio::test]
    async fn test_writes_after_sync_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vars.pubvar");

        let id;
        {
            let store = FileStore::create(&path).unwrap();
            id = store
                .create_new(content! { "n" => 0 }, &coordinate("b"), &CreateOpts::local())
                .await
                .unwrap()
                .id;
            store.sync().unwrap();
            store.update(&id, content! { "n" => 1 }).await.unwrap();
            // dropped here: sync on drop rewrites the index
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.load(&id).await.unwrap().field("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_scan_recovers_unsynced_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vars.pubvar");

        let id;
        {
            let store = FileStore::create(&path).unwrap();
            id = store
                .resolve_deterministic(&coordinate("c"), &CreateOpts::local())
                .await
                .unwrap()
                .id;
            store.update(&id, content! { "value" => 42 }).await.unwrap();
            // Skip the drop-time sync to simulate a crash
            std::mem::forget(store);
        }

        // Garbage tail, e.g. a torn write
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let doc = store.load(&id).await.unwrap();
        assert_eq!(doc.version_count, 1);
        assert_eq!(doc.field("value"), Some(&json!(42)));

        // New writes land after the last valid record
        store.update(&id, content! { "value" => 43 }).await.unwrap();
        store.sync().unwrap();
        drop(store);
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.load(&id).await.unwrap().field("value"), Some(&json!(43)));
    }
}
