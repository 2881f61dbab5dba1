//! Compact binary model (`.frag`)
//!
//! Layout: a CBOR-encoded [`FragHeader`] followed by the CBOR content, the
//! parsed STEP header plus every entity instance in ascending id order.
//! The header carries the content length and SHA-256 checksums of itself and
//! of the content, so truncation and corruption are caught before decoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use ifcx_ingest_step::{IfcModel, StepEntity, StepHeader};

// ============================================================================
// Format Header with Checksum
// ============================================================================

/// Magic bytes: "IFXF"
pub const MAGIC: [u8; 4] = [0x49, 0x46, 0x58, 0x46];

/// Current format version (major.minor.patch packed as 0x00MMmmpp)
pub const VERSION: u32 = 0x00_01_00_00; // 1.0.0

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub entity_count: u64,
    pub content_length: u64,
    pub content_checksum: [u8; 32],
    /// SHA-256 of the fields above.
    pub header_checksum: [u8; 32],
}

impl FragHeader {
    pub fn new(content: &[u8], entity_count: u64) -> Self {
        let mut header = Self {
            magic: MAGIC,
            version: VERSION,
            entity_count,
            content_length: content.len() as u64,
            content_checksum: sha256(content),
            header_checksum: [0u8; 32],
        };
        header.header_checksum = header.compute_header_checksum();
        header
    }

    fn compute_header_checksum(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.magic);
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.entity_count.to_le_bytes());
        hasher.update(self.content_length.to_le_bytes());
        hasher.update(self.content_checksum);
        hasher.finalize().into()
    }

    pub fn verify(&self) -> Result<(), FragError> {
        if self.magic != MAGIC {
            return Err(FragError::InvalidMagic);
        }
        if !is_version_compatible(self.version, VERSION) {
            return Err(FragError::IncompatibleVersion {
                file_version: self.version,
                reader_version: VERSION,
            });
        }
        if self.header_checksum != self.compute_header_checksum() {
            return Err(FragError::HeaderChecksumMismatch);
        }
        Ok(())
    }

    pub fn verify_content(&self, content: &[u8]) -> Result<(), FragError> {
        if content.len() as u64 != self.content_length {
            return Err(FragError::ContentLengthMismatch {
                expected: self.content_length,
                actual: content.len() as u64,
            });
        }
        if sha256(content) != self.content_checksum {
            return Err(FragError::ContentChecksumMismatch);
        }
        Ok(())
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn is_version_compatible(file_version: u32, reader_version: u32) -> bool {
    let file_major = (file_version >> 16) & 0xFF;
    let reader_major = (reader_version >> 16) & 0xFF;
    if file_major != reader_major {
        return false;
    }
    let file_minor = (file_version >> 8) & 0xFF;
    let reader_minor = (reader_version >> 8) & 0xFF;
    reader_minor >= file_minor
}

// ============================================================================
// Content
// ============================================================================

#[derive(Serialize)]
struct ContentRef<'a> {
    header: &'a StepHeader,
    entities: Vec<&'a StepEntity>,
}

#[derive(Deserialize)]
struct Content {
    header: StepHeader,
    entities: Vec<StepEntity>,
}

/// Serialize a parsed model.
pub fn encode_frag(model: &IfcModel) -> Result<Vec<u8>, FragError> {
    let entities = model.sorted_entities();
    let entity_count = entities.len() as u64;

    let mut content = Vec::new();
    ciborium::into_writer(
        &ContentRef {
            header: model.header(),
            entities,
        },
        &mut content,
    )
    .map_err(|e| FragError::Serialization(e.to_string()))?;

    let header = FragHeader::new(&content, entity_count);
    let mut output = Vec::with_capacity(content.len() + 128);
    ciborium::into_writer(&header, &mut output)
        .map_err(|e| FragError::Serialization(e.to_string()))?;
    output.extend_from_slice(&content);
    Ok(output)
}

/// Read only the header, verified.
pub fn read_header(data: &[u8]) -> Result<(FragHeader, usize), FragError> {
    let mut cursor = std::io::Cursor::new(data);
    let header: FragHeader = ciborium::from_reader(&mut cursor)
        .map_err(|e| FragError::Deserialization(e.to_string()))?;
    header.verify()?;
    Ok((header, cursor.position() as usize))
}

/// Verify and decode a `.frag` file back into an entity table.
pub fn decode_frag(data: &[u8]) -> Result<IfcModel, FragError> {
    let (header, offset) = read_header(data)?;
    let content = &data[offset..];
    header.verify_content(content)?;

    let decoded: Content = ciborium::from_reader(content)
        .map_err(|e| FragError::Deserialization(e.to_string()))?;
    if decoded.entities.len() as u64 != header.entity_count {
        return Err(FragError::EntityCountMismatch {
            expected: header.entity_count,
            actual: decoded.entities.len() as u64,
        });
    }
    Ok(IfcModel::from_parts(decoded.header, decoded.entities))
}

/// Cheap check used for format sniffing.
pub fn looks_like_frag(data: &[u8]) -> bool {
    read_header(data).is_ok()
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FragError {
    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Incompatible version: file {file_version:#x}, reader {reader_version:#x}")]
    IncompatibleVersion {
        file_version: u32,
        reader_version: u32,
    },

    #[error("Header checksum mismatch")]
    HeaderChecksumMismatch,

    #[error("Content length mismatch: expected {expected}, got {actual}")]
    ContentLengthMismatch { expected: u64, actual: u64 },

    #[error("Content checksum mismatch")]
    ContentChecksumMismatch,

    #[error("Entity count mismatch: header says {expected}, content has {actual}")]
    EntityCountMismatch { expected: u64, actual: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &[u8] = b"ISO-10303-21;HEADER;FILE_SCHEMA(('IFC4'));ENDSEC;DATA;\
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'P',$,$,$,$,$,$);\
#2=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'W',$,$,$,$,'T1',$);\
#3=IFCRELAGGREGATES('3vB2YO$MX4xv5uCqZZG05x',$,$,$,#1,(#2));\
ENDSEC;END-ISO-10303-21;";

    #[test]
    fn test_frag_preserves_entities() {
        let model = IfcModel::parse(SRC).unwrap();
        let bytes = encode_frag(&model).unwrap();
        let back = decode_frag(&bytes).unwrap();

        assert_eq!(back.len(), 3);
        assert_eq!(back.header().file_schema, vec!["IFC4".to_string()]);
        assert_eq!(back.get(2), model.get(2));
        assert_eq!(back.ids_of_type("IFCWALL"), &[2]);
        assert!(looks_like_frag(&bytes));
        assert!(!looks_like_frag(SRC));
    }

    #[test]
    fn test_corrupted_content_detected() {
        let model = IfcModel::parse(SRC).unwrap();
        let mut bytes = encode_frag(&model).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode_frag(&bytes),
            Err(FragError::ContentChecksumMismatch)
        ));
    }

    #[test]
    fn test_truncated_content_detected() {
        let model = IfcModel::parse(SRC).unwrap();
        let bytes = encode_frag(&model).unwrap();
        assert!(matches!(
            decode_frag(&bytes[..bytes.len() - 4]),
            Err(FragError::ContentLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_version_compatibility() {
        assert!(is_version_compatible(0x00_01_00_00, 0x00_01_02_00));
        assert!(!is_version_compatible(0x00_01_03_00, 0x00_01_02_00));
        assert!(!is_version_compatible(0x00_02_00_00, 0x00_01_00_00));
    }
}
