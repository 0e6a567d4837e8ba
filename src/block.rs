//! Record aligned block reader.

use std::io;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::marker::PhantomData;

use crate::codec::RunCodec;
use crate::error::SortError;
use crate::run::RunId;

/// Result of a block pull.
#[derive(Debug, PartialEq, Eq)]
pub enum Pull {
    /// Block of whole records.
    Block(Vec<u8>),
    /// The run has no more data.
    EndOfRun,
}

/// Streams a run as a sequence of blocks each holding only whole records.
/// Memory used by the reader is bounded by the block size no matter how large the run is.
pub struct BlockReader<'c, T, C, R> {
    run: RunId,
    reader: R,
    codec: &'c C,
    block_size: usize,
    exhausted: bool,

    item_type: PhantomData<fn() -> T>,
}

impl<'c, T, C, R> BlockReader<'c, T, C, R>
where
    C: RunCodec<T>,
    R: Read + Seek,
{
    /// Creates a block reader positioned at the start of `reader`.
    ///
    /// # Arguments
    /// * `run` - Identifier of the run being read
    /// * `reader` - Run data
    /// * `codec` - Codec the run was written with
    /// * `block_size` - Maximum number of bytes read at once
    pub fn new(run: RunId, reader: R, codec: &'c C, block_size: usize) -> Self {
        BlockReader {
            run,
            reader,
            codec,
            block_size,
            exhausted: false,
            item_type: PhantomData,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Reads the next block.
    ///
    /// If the raw read ends in the middle of a record the reader moves its cursor back to the
    /// last record boundary so the cut record starts the next block.
    pub fn pull(&mut self) -> Result<Pull, SortError> {
        if self.exhausted {
            return Ok(Pull::EndOfRun);
        }

        let mut block = vec![0; self.block_size];
        let filled = read_full(&mut self.reader, &mut block)?;
        if filled == 0 {
            self.exhausted = true;
            return Ok(Pull::EndOfRun);
        }

        let at_eof = filled < self.block_size;
        block.truncate(filled);

        let boundary = self
            .codec
            .record_boundary(&block, at_eof)
            .map_err(|source| SortError::Decode { run: self.run, source })?;

        if boundary == 0 {
            return Err(if at_eof {
                SortError::CorruptRun(self.run)
            } else {
                SortError::OversizedRecord {
                    run: self.run,
                    block_size: self.block_size,
                }
            });
        }

        if boundary < filled {
            self.reader.seek(SeekFrom::Current(boundary as i64 - filled as i64))?;
            block.truncate(boundary);
        }

        return Ok(Pull::Block(block));
    }
}

impl<'c, T, C, R> Iterator for BlockReader<'c, T, C, R>
where
    C: RunCodec<T>,
    R: Read + Seek,
{
    type Item = Result<Vec<u8>, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.pull() {
            Ok(Pull::Block(block)) => Some(Ok(block)),
            Ok(Pull::EndOfRun) => None,
            Err(err) => {
                self.exhausted = true;
                Some(Err(err))
            }
        }
    }
}

/// Reads until `buf` is full or the reader is drained.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    return Ok(filled);
}
