//! Batch log records
//!
//! Encoding and decoding of one framed batch record.

use serde::{Deserialize, Serialize};

use crate::buffer::Batch;
use crate::error::{Result, StrataError};
use crate::mutation::Mutation;

/// Header size: batch id (8) + crc (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// Maximum payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// One batch as written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedBatch {
    pub table: String,

    pub batch_id: u64,

    /// Root region server known when the batch was applied
    pub root_server: Option<String>,

    /// Unix millis at write time
    pub written_at: u64,

    pub mutations: Vec<Mutation>,
}

impl LoggedBatch {
    pub fn from_batch(batch: &Batch, root_server: Option<String>) -> Self {
        Self {
            table: batch.table().to_string(),
            batch_id: batch.id(),
            root_server,
            written_at: unix_millis(),
            mutations: batch.mutations().to_vec(),
        }
    }

    /// Encode as a framed record: header + payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(StrataError::Serialization(format!(
                "Batch payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let crc = crc32fast::hash(&payload);

        let mut record = Vec::with_capacity(HEADER_SIZE + payload.len());
        record.extend_from_slice(&self.batch_id.to_le_bytes());
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);

        Ok(record)
    }

    /// Decode a payload after checking it against the header fields
    pub fn decode(batch_id: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(StrataError::LogCorruption(format!(
                "CRC mismatch for batch {}: expected {:08x}, got {:08x}",
                batch_id, crc, actual
            )));
        }

        let logged: LoggedBatch = bincode::deserialize(payload)?;
        if logged.batch_id != batch_id {
            return Err(StrataError::LogCorruption(format!(
                "Header batch id {} does not match payload batch id {}",
                batch_id, logged.batch_id
            )));
        }

        Ok(logged)
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
