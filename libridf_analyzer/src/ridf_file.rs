use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::constants::{BLOCK_HEADER_SIZE, RECORD_SIZE_MASK, SIZE_UNIT};
use super::error::RidfFileError;

/// Sequential reader of RIDF blocks from an on-disk file.
///
/// A RIDF file is a plain concatenation of blocks. Each fetch reads the
/// 8-byte block header, takes the block length from the low 22 bits of the
/// first word (counted in 16-bit words), then reads the rest of the block.
#[derive(Debug)]
pub struct RidfFile {
    handle: File,
    path: PathBuf,
}

impl RidfFile {
    pub fn open(path: &Path) -> Result<Self, RidfFileError> {
        if !path.exists() {
            return Err(RidfFileError::BadFilePath(path.to_path_buf()));
        }
        Ok(Self {
            handle: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    /// Read the next block into `buf` and return its byte length.
    ///
    /// `Err(EndOfFile)` means the file ended cleanly on a block boundary.
    /// A file that ends inside a block header or block body is an IO error,
    /// not a partial block.
    pub fn next_block(&mut self, buf: &mut [u8]) -> Result<usize, RidfFileError> {
        // Fill the 8-byte header by hand: only a read that yields nothing at
        // all is a clean end of stream. A partial header is truncation.
        let mut filled = 0;
        while filled < BLOCK_HEADER_SIZE {
            let n = match self.handle.read(&mut buf[filled..BLOCK_HEADER_SIZE]) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                if filled == 0 {
                    return Err(RidfFileError::EndOfFile);
                }
                return Err(RidfFileError::IOError(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "file truncated inside a block header",
                )));
            }
            filled += n;
        }

        let size_word = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let block_len = ((size_word & RECORD_SIZE_MASK) as usize) * SIZE_UNIT;
        if block_len < BLOCK_HEADER_SIZE || block_len > buf.len() {
            return Err(RidfFileError::MalformedBlock(block_len, buf.len()));
        }

        self.handle.read_exact(&mut buf[BLOCK_HEADER_SIZE..block_len])?;
        Ok(block_len)
    }

    /// Seek back to the first block.
    pub fn rewind(&mut self) -> Result<(), RidfFileError> {
        self.handle.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
