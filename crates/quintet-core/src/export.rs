//! # Canonical Export Module
//!
//! > **The redb compromise:**
//! > - Runtime: the journal lives in `redb` for ACID appends.
//! > - Verification: `redb` files are not bit-identical across runs.
//! > - So `export_canonical()` writes a bit-exact `postcard` stream of the
//! >   log, and that stream is what checksums and hashes are taken over.
//!
//! Layout: `[header_len: u32 LE] [postcard header] [postcard LogImage]`.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::formats::LogImage;
use crate::QuintetError;
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"QNTX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum allowed fact count in canonical imports.
pub const MAX_IMPORT_FACT_COUNT: u64 = 10_000_000;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub fact_count: u64,
    /// Checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(fact_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            fact_count,
            checksum,
        }
    }

    /// Validate the header. Messages stay generic.
    pub fn validate(&self) -> Result<(), QuintetError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(QuintetError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(QuintetError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        if self.fact_count > MAX_IMPORT_FACT_COUNT {
            return Err(QuintetError::DeserializationError(format!(
                "Fact count {} exceeds maximum allowed {}",
                self.fact_count, MAX_IMPORT_FACT_COUNT
            )));
        }
        Ok(())
    }
}

// =============================================================================
// CHECKSUM
// =============================================================================

/// FNV-1a over the encoded data section.
///
/// Deterministic and order-sensitive: two logs with the same facts in a
/// different order differ. Not collision resistant; use the BLAKE3 hash
/// (`crypto-hash` feature) where that matters.
#[must_use]
pub fn checksum_bytes(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    data.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

fn encode_image(engine: &Engine) -> Result<Vec<u8>, QuintetError> {
    postcard::to_allocvec(&LogImage::of(engine))
        .map_err(|e| QuintetError::SerializationError(format!("Data: {e}")))
}

/// Checksum of an engine's canonical data section.
pub fn canonical_checksum(engine: &Engine) -> Result<u64, QuintetError> {
    encode_image(engine).map(|data| checksum_bytes(&data))
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export an engine's log to the canonical format.
pub fn export_canonical(engine: &Engine) -> Result<Vec<u8>, QuintetError> {
    let data_bytes = encode_image(engine)?;
    let header = CanonicalHeader::new(engine.store().len() as u64, checksum_bytes(&data_bytes));
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| QuintetError::SerializationError(format!("Header: {e}")))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Split canonical bytes into a validated header and its data section.
fn split(data: &[u8]) -> Result<(CanonicalHeader, &[u8]), QuintetError> {
    let too_short = || QuintetError::DeserializationError("Data too short".to_string());
    let length: [u8; 4] = data
        .get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(too_short)?;
    let header_len = u32::from_le_bytes(length) as usize;
    let header_bytes = data
        .get(4..4usize.saturating_add(header_len))
        .ok_or_else(too_short)?;
    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| QuintetError::DeserializationError(format!("Header: {e}")))?;
    header.validate()?;

    let body = &data[4 + header_len..];
    let computed = checksum_bytes(body);
    if computed != header.checksum {
        return Err(QuintetError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    Ok((header, body))
}

/// Import a canonical export into a fresh engine.
pub fn import_canonical(data: &[u8], config: EngineConfig) -> Result<Engine, QuintetError> {
    let (header, body) = split(data)?;
    let image: LogImage = postcard::from_bytes(body)
        .map_err(|e| QuintetError::DeserializationError(format!("Data: {e}")))?;
    if image.facts.len() as u64 != header.fact_count {
        return Err(QuintetError::DeserializationError(
            "Fact count mismatch".to_string(),
        ));
    }
    image.into_engine(config)
}

/// Check that `canonical_data` is exactly the export of `engine`.
pub fn verify_canonical(engine: &Engine, canonical_data: &[u8]) -> Result<bool, QuintetError> {
    Ok(export_canonical(engine)? == canonical_data)
}

/// BLAKE3 hash of the canonical export, hex encoded.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(engine: &Engine) -> Result<String, QuintetError> {
    export_canonical(engine).map(|data| compute_blake3_hash(&data))
}

/// BLAKE3 hash of raw bytes, hex encoded.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryMode, ReadOptions, Statement, Subject};

    fn create_test_engine() -> Engine {
        let mut engine = Engine::new();
        let sym = Subject::symbol;
        engine
            .assert_batch(vec![
                Statement::assign(sym("p1"), sym("kind"), sym("person")),
                Statement::assign(sym("p1"), sym("age"), Subject::int(40)),
                Statement::require(sym("people"), sym("kind"), sym("person")),
            ])
            .expect("batch");
        engine
    }

    #[test]
    fn export_import_roundtrip() {
        let engine = create_test_engine();
        let data = export_canonical(&engine).expect("export");
        let imported = import_canonical(&data, EngineConfig::default()).expect("import");

        assert_eq!(imported.store().facts(), engine.store().facts());
        let people = imported
            .query(&Subject::symbol("people"), QueryMode::Evaluate, ReadOptions::new())
            .expect("evaluate");
        assert_eq!(people.len(), 1);
        assert!(verify_canonical(&imported, &data).expect("verify"));
    }

    #[test]
    fn export_is_deterministic() {
        let first = export_canonical(&create_test_engine()).expect("export");
        let second = export_canonical(&create_test_engine()).expect("export");
        assert_eq!(first, second);
        assert_eq!(
            canonical_checksum(&create_test_engine()).expect("checksum"),
            canonical_checksum(&create_test_engine()).expect("checksum")
        );
    }

    #[test]
    fn checksum_is_order_sensitive() {
        assert_ne!(checksum_bytes(&[1, 2]), checksum_bytes(&[2, 1]));
    }

    #[test]
    fn corrupted_data_is_rejected() {
        let mut data = export_canonical(&create_test_engine()).expect("export");
        if let Some(last) = data.last_mut() {
            *last ^= 0xff;
        }
        assert!(import_canonical(&data, EngineConfig::default()).is_err());
        assert!(import_canonical(&[1, 2], EngineConfig::default()).is_err());
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_stable() {
        let engine = create_test_engine();
        let hash = canonical_crypto_hash(&engine).expect("hash");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, canonical_crypto_hash(&engine).expect("hash"));
    }
}
