//! Batch log reader
//!
//! Reads records back in write order. A torn record at the tail (crash
//! mid-append) ends the log; a checksum mismatch is an error.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{Result, StrataError};

use super::entry::{LoggedBatch, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Sequential reader over a batch log
pub struct BatchLogReader {
    reader: BufReader<File>,

    /// Byte offset of the next record
    position: u64,
}

impl BatchLogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read every complete record in `path`
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<LoggedBatch>> {
        let mut reader = Self::open(path)?;
        let mut batches = Vec::new();
        while let Some(batch) = reader.next_batch()? {
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Read the next record; `None` at end of log or at a torn tail
    pub fn next_batch(&mut self) -> Result<Option<LoggedBatch>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = self.read_full(&mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            tracing::debug!(position = self.position, "Torn record header at end of batch log");
            return Ok(None);
        }

        let batch_id = u64::from_le_bytes([
            header[0], header[1], header[2], header[3], header[4], header[5], header[6], header[7],
        ]);
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);

        if len > MAX_PAYLOAD_SIZE {
            return Err(StrataError::LogCorruption(format!(
                "Record at offset {} claims {} bytes (max {})",
                self.position, len, MAX_PAYLOAD_SIZE
            )));
        }

        let mut payload = vec![0u8; len as usize];
        let read = self.read_full(&mut payload)?;
        if read < payload.len() {
            tracing::debug!(position = self.position, "Torn record payload at end of batch log");
            return Ok(None);
        }

        let batch = LoggedBatch::decode(batch_id, crc, &payload)?;
        self.position += (HEADER_SIZE + payload.len()) as u64;

        Ok(Some(batch))
    }

    /// Offset of the next unread record
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` as far as the file allows; returns bytes read
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}
