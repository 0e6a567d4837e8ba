//! `kway-sort` is an external k-way merge sort implementation.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! Sorting is done in two phases:
//!
//! * **Run generation:**
//!   the input is split into chunks whose accounted size (`records * record_size`) fits a third of the memory
//!   budget. Every chunk is sorted in memory and written to disk as a sorted *run*.
//! * **Merging:**
//!   runs are merged in passes. Each pass merges consecutive batches of at most `memory_budget / block_size`
//!   runs (capped by `max_open_runs`) until a single run is left. That run is moved to the destination.
//!   Runs are streamed in record aligned blocks of `block_size` bytes, so a merge never holds more than one
//!   block per input run in memory.
//!
//! Runs are stored as text (one record per line) by default. MessagePack storage is available through
//! [`RmpCodec`].
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use kway_sort::{ExternalSorter, ExternalSorterBuilder, LineRecords};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!
//!     let sorter: ExternalSorter<i64> = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_memory_budget(50 * 1024 * 1024)
//!         .with_block_size(4096)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter
//!         .sort(LineRecords::new(input_reader), path::Path::new("output.txt"))
//!         .unwrap();
//!     println!("{} records sorted", summary.records);
//! }
//! ```

pub mod block;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod generator;
pub mod input;
pub mod merger;
pub mod run;
pub mod scheduler;
pub mod sort;

pub use block::{BlockReader, Pull};
pub use buffer::RunBuffer;
pub use codec::{RmpCodec, RunCodec, TextCodec};
pub use error::SortError;
pub use generator::RunGenerator;
pub use input::{LineRecords, ParseRecordError};
pub use merger::{merge_batch, KWayMerger};
pub use run::{Run, RunId, RunStorage, RunWriter, TempDirStorage};
pub use scheduler::{MergeScheduler, MergeStats};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortSummary};
