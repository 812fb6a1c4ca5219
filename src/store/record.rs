//! Record type - one document version as written to the file store

use crate::model::{Content, Document, DocumentId, Metadata};
use serde::{Deserialize, Serialize};

/// Kind tag for records
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// First version of a document
    Genesis,
    /// A later version produced by an update
    Update,
}

impl RecordKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            RecordKind::Genesis => 0,
            RecordKind::Update => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordKind::Genesis),
            1 => Some(RecordKind::Update),
            _ => None,
        }
    }
}

/// Bincode-friendly form of a document version.
///
/// Content is kept as a JSON string since bincode cannot decode
/// self-describing `serde_json::Value`s.
#[derive(Serialize, Deserialize)]
struct StoredVersion {
    id: DocumentId,
    metadata: Metadata,
    content: String,
    version_count: u64,
}

/// A typed, compressed document version
#[derive(Clone, Debug)]
pub struct Record {
    pub kind: RecordKind,
    pub document: Document,
}

impl Record {
    pub fn new(document: Document) -> Self {
        let kind = if document.version_count == 0 {
            RecordKind::Genesis
        } else {
            RecordKind::Update
        };
        Record { kind, document }
    }

    /// Encode for storage: kind byte followed by zstd-compressed bincode
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let stored = StoredVersion {
            id: self.document.id,
            metadata: self.document.metadata.clone(),
            content: serde_json::to_string(&self.document.content)?,
            version_count: self.document.version_count,
        };
        let data = bincode::serialize(&stored)?;

        let mut output = Vec::new();
        output.push(self.kind.as_byte());
        let compressed = zstd::encode_all(data.as_slice(), 3)?;
        output.extend(compressed);
        Ok(output)
    }

    /// Decode a record read back from storage
    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        if data.is_empty() {
            return Err(crate::Error::Corruption("Empty record data".into()));
        }

        let kind = RecordKind::from_byte(data[0])
            .ok_or_else(|| crate::Error::Corruption(format!("Invalid record kind: {}", data[0])))?;

        let decompressed = zstd::decode_all(&data[1..])?;
        let stored: StoredVersion = bincode::deserialize(&decompressed)?;
        let content: Content = serde_json::from_str(&stored.content)?;

        let expected = if stored.version_count == 0 {
            RecordKind::Genesis
        } else {
            RecordKind::Update
        };
        if kind != expected {
            return Err(crate::Error::Corruption(format!(
                "Record kind {:?} does not match version {} of {}",
                kind, stored.version_count, stored.id
            )));
        }

        Ok(Record {
            kind,
            document: Document {
                id: stored.id,
                metadata: stored.metadata,
                content,
                version_count: stored.version_count,
            },
        })
    }

    /// Short checksum framing each record on disk
    pub fn checksum(encoded: &[u8]) -> [u8; 8] {
        let hash = blake3::hash(encoded);
        let mut out = [0u8; 8];
        out.copy_from_slice(&hash.as_bytes()[..8]);
        out
    }
}
