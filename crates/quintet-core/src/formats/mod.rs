//! # Formats
//!
//! Byte-level encodings of the fact log. File I/O lives in the app.

pub mod persistence;

pub use persistence::{
    LogImage, MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, engine_from_bytes, engine_to_bytes,
};
