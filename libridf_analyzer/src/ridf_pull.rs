use std::io::{Read, Write};
use std::net::TcpStream;

use super::constants::{
    CID_BLOCK_NUMBER, EB_GET_BLOCKNUM, EB_GET_RAWDATA, EB_INFO_PORT, RECORD_CID_MASK,
    RECORD_CID_SHIFT, RECORD_SIZE_MASK, SIZE_UNIT,
};
use super::error::RidfPullError;

/// Offset of the block-sequence number inside a live block.
const BLOCK_NUMBER_OFFSET: usize = 16;

/// Pulls raw blocks from the event-builder information service.
///
/// Every pull is one short-lived TCP exchange: connect, send a 4-byte
/// length-prefixed command word, read the length-prefixed reply, disconnect.
/// The service keeps handing out the current block, so the puller remembers
/// the last block-sequence number and reports "no new data" until the
/// sequence advances.
#[derive(Debug)]
pub struct RidfPull {
    host: String,
    port: u16,
    last_block_number: i32,
}

impl RidfPull {
    pub fn new(host: &str) -> Self {
        Self::with_port(host, EB_INFO_PORT)
    }

    /// Bind to a non-standard service port. Mostly useful for test fixtures.
    pub fn with_port(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            last_block_number: 0,
        }
    }

    /// One request/response round trip. The socket closes on return.
    fn request(&self, command: u32, buf: &mut [u8]) -> Result<usize, RidfPullError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| RidfPullError::ConnectFailed(self.host.clone(), e))?;

        stream.write_all(&4u32.to_le_bytes())?;
        stream.write_all(&command.to_le_bytes())?;

        let mut len_bytes = [0u8; 4];
        stream
            .read_exact(&mut len_bytes)
            .map_err(|_| RidfPullError::ShortReply(self.host.clone()))?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > buf.len() {
            return Err(RidfPullError::ReplyTooLarge(len, buf.len()));
        }
        stream
            .read_exact(&mut buf[..len])
            .map_err(|_| RidfPullError::ShortReply(self.host.clone()))?;

        Ok(len)
    }

    /// Fetch the latest raw block into `buf`.
    ///
    /// Returns the block byte length, or 0 when the event builder has not
    /// produced a fresh block since the previous pull. `buf` must be at
    /// least 2 MiB, the service's block granularity.
    pub fn pull(&mut self, buf: &mut [u8]) -> Result<usize, RidfPullError> {
        let len = self.request(EB_GET_RAWDATA, buf)?;
        if len < BLOCK_NUMBER_OFFSET + 4 {
            return Ok(0);
        }

        let size_word = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let header = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let cid = (header >> RECORD_CID_SHIFT) & RECORD_CID_MASK;
        if cid != CID_BLOCK_NUMBER {
            return Ok(0);
        }

        let block_number = i32::from_le_bytes(
            buf[BLOCK_NUMBER_OFFSET..BLOCK_NUMBER_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        if block_number == self.last_block_number {
            return Ok(0);
        }

        self.last_block_number = block_number;
        Ok(((size_word & RECORD_SIZE_MASK) as usize) * SIZE_UNIT)
    }

    /// Ask the event builder for its current block-sequence number.
    pub fn block_number(&self) -> Result<i32, RidfPullError> {
        let mut reply = [0u8; 8];
        let len = self.request(EB_GET_BLOCKNUM, &mut reply)?;
        if len < 4 {
            return Err(RidfPullError::ShortReply(self.host.clone()));
        }
        Ok(i32::from_le_bytes(reply[0..4].try_into().unwrap()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}
