//! Binary heap k-way merger.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::io::prelude::*;

use log;

use crate::block::{BlockReader, Pull};
use crate::codec::RunCodec;
use crate::error::SortError;
use crate::run::{Run, RunId, RunStorage, RunWriter};

/// Current head of an input run. Ordered by the record first, ties go to the lower run index.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry<T> {
    item: T,
    run: usize,
}

/// Decoded records of the current block of a run plus the reader of the blocks to come.
struct RunCursor<'c, T, C, R> {
    blocks: BlockReader<'c, T, C, R>,
    queue: VecDeque<T>,
}

impl<'c, T, C, R> RunCursor<'c, T, C, R>
where
    C: RunCodec<T>,
    R: Read + Seek,
{
    /// Returns the next record of the run or `None` once the run is exhausted.
    fn next_item(&mut self, codec: &C) -> Result<Option<T>, SortError> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Ok(Some(item));
            }

            match self.blocks.pull()? {
                Pull::Block(block) => {
                    let run = self.blocks.run();
                    codec
                        .decode_block(&block, &mut self.queue)
                        .map_err(|source| SortError::Decode { run, source })?;
                }
                Pull::EndOfRun => return Ok(None),
            }
        }
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted runs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of runs (inputs).
pub struct KWayMerger<'c, T, C, R> {
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    items: BinaryHeap<Reverse<HeapEntry<T>>>,
    cursors: Vec<RunCursor<'c, T, C, R>>,
    codec: &'c C,
    initiated: bool,
}

impl<'c, T, C, R> KWayMerger<'c, T, C, R>
where
    T: Ord,
    C: RunCodec<T>,
    R: Read + Seek,
{
    /// Creates an instance of a k-way merger using block readers as inputs.
    /// Run records should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `codec` - Codec the runs were written with
    /// * `readers` - Block readers of the runs to be merged in a single sorted one
    pub fn new<I>(codec: &'c C, readers: I) -> Self
    where
        I: IntoIterator<Item = BlockReader<'c, T, C, R>>,
    {
        let cursors = Vec::from_iter(readers.into_iter().map(|blocks| RunCursor {
            blocks,
            queue: VecDeque::new(),
        }));
        let items = BinaryHeap::with_capacity(cursors.len());

        return KWayMerger {
            items,
            cursors,
            codec,
            initiated: false,
        };
    }

    fn advance(&mut self, run: usize) -> Result<(), SortError> {
        if let Some(item) = self.cursors[run].next_item(self.codec)? {
            self.items.push(Reverse(HeapEntry { item, run }));
        }

        return Ok(());
    }
}

impl<'c, T, C, R> Iterator for KWayMerger<'c, T, C, R>
where
    T: Ord,
    C: RunCodec<T>,
    R: Read + Seek,
{
    type Item = Result<T, SortError>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            for run in 0..self.cursors.len() {
                if let Err(err) = self.advance(run) {
                    return Some(Err(err));
                }
            }
        }

        let Reverse(HeapEntry { item, run }) = self.items.pop()?;
        if let Err(err) = self.advance(run) {
            return Some(Err(err));
        }

        return Some(Ok(item));
    }
}

/// Merges a batch of sorted runs into a new run `output`.
/// The output run is sealed before it is returned; the input runs are left untouched.
///
/// # Arguments
/// * `storage` - Storage holding the input runs and receiving the output run
/// * `codec` - Run record encoding
/// * `inputs` - Runs to be merged
/// * `output` - Identifier of the merged run
/// * `block_size` - Read block size of every input run
pub fn merge_batch<T, C, S>(
    storage: &S,
    codec: &C,
    inputs: &[Run],
    output: RunId,
    block_size: usize,
) -> Result<Run, SortError>
where
    T: Ord,
    C: RunCodec<T>,
    S: RunStorage,
{
    let mut readers = Vec::with_capacity(inputs.len());
    for run in inputs {
        readers.push(BlockReader::new(run.id(), storage.open(run.id())?, codec, block_size));
    }

    log::debug!("merging {} runs into {}", inputs.len(), output);
    let mut writer = RunWriter::new(output, storage.create(output)?);
    for item in KWayMerger::new(codec, readers) {
        writer.push(codec, &item?)?;
    }

    return Ok(writer.finish(storage)?);
}
