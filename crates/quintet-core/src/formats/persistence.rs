//! # Persistence Format
//!
//! Binary snapshots of an engine's fact log.
//!
//! Format: Header (5 bytes) + postcard-serialized `LogImage`.
//! - 4 bytes: Magic ("QNTT")
//! - 1 byte: Version
//!
//! Size and header checks run before the payload is decoded.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::registry::RegistryState;
use crate::{Fact, QuintetError, primitives};
use serde::{Deserialize, Serialize};

/// Maximum allowed payload size for the snapshot format (500 MB).
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 500 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), QuintetError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(QuintetError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(QuintetError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, QuintetError> {
        let header = bytes
            .get(..HEADER_SIZE)
            .ok_or_else(|| QuintetError::DeserializationError("Header too short".to_string()))?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// LOG IMAGE
// =============================================================================

/// Everything needed to rebuild an engine: the registry state and the log.
///
/// Subscriptions and host functions are runtime state and are not saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogImage {
    pub registry: RegistryState,
    pub facts: Vec<Fact>,
}

impl LogImage {
    #[must_use]
    pub fn of(engine: &Engine) -> Self {
        Self {
            registry: engine.registry().state(),
            facts: engine.store().facts().to_vec(),
        }
    }

    pub fn into_engine(self, config: EngineConfig) -> Result<Engine, QuintetError> {
        Engine::replay(self.facts, self.registry, config)
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize an engine's log to bytes (header + payload).
pub fn engine_to_bytes(engine: &Engine) -> Result<Vec<u8>, QuintetError> {
    let payload = postcard::to_allocvec(&LogImage::of(engine))
        .map_err(|e| QuintetError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Rebuild an engine from snapshot bytes.
pub fn engine_from_bytes(bytes: &[u8], config: EngineConfig) -> Result<Engine, QuintetError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(QuintetError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }
    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let image: LogImage = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        QuintetError::DeserializationError(format!("Failed to decode fact log: {e}"))
    })?;
    image.into_engine(config)
}

// =============================================================================
// TESTS
// =============================================================================
