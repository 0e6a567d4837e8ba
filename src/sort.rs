//! External sorter.

use std::error::Error;
use std::marker::PhantomData;
use std::path::Path;

use log;

use crate::codec::{RunCodec, TextCodec};
use crate::error::SortError;
use crate::generator::RunGenerator;
use crate::run::TempDirStorage;
use crate::scheduler::MergeScheduler;

/// Default total working memory limit in bytes.
pub const DEFAULT_MEMORY_BUDGET: u64 = 100 * 1024 * 1024;
/// Default run read block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 512;
/// Default limit of runs open at once during a merge.
pub const DEFAULT_MAX_OPEN_RUNS: usize = 512;
/// Default accounted size of a single record in bytes.
pub const DEFAULT_RECORD_SIZE: u64 = 40;

/// Share of the memory budget given to run generation is `1 / RUN_BUDGET_DIVISOR`.
const RUN_BUDGET_DIVISOR: u64 = 3;

/// Sorting summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of sorted records.
    pub records: u64,
    /// Number of runs produced by run generation.
    pub runs: usize,
    /// Number of merge passes.
    pub passes: usize,
    /// Number of merges over all passes.
    pub merges: usize,
    /// Largest number of runs merged at once.
    pub max_batch_len: usize,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<T, C = TextCodec<T>>
where
    T: Ord + Send,
    C: RunCodec<T>,
{
    /// Number of threads to be used to sort runs in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run file write buffer size.
    rw_buf_size: Option<usize>,
    /// Total working memory limit in bytes.
    memory_budget: u64,
    /// Run read block size in bytes.
    block_size: usize,
    /// Limit of runs open at once during a merge.
    max_open_runs: usize,
    /// Accounted size of a single record in bytes.
    record_size: u64,
    /// Run codec.
    codec: C,

    /// Input item type.
    item_type: PhantomData<fn() -> T>,
}

impl<T, C> ExternalSorterBuilder<T, C>
where
    T: Ord + Send,
    C: RunCodec<T> + Default,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }
}

impl<T, C> ExternalSorterBuilder<T, C>
where
    T: Ord + Send,
    C: RunCodec<T>,
{
    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<T, C>, SortError> {
        ExternalSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
            self.memory_budget,
            self.block_size,
            self.max_open_runs,
            self.record_size,
            self.codec,
        )
    }

    /// Sets number of threads to be used to sort runs in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<T, C> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<T, C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets run file write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<T, C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets total working memory limit in bytes.
    pub fn with_memory_budget(mut self, memory_budget: u64) -> ExternalSorterBuilder<T, C> {
        self.memory_budget = memory_budget;
        return self;
    }

    /// Sets run read block size in bytes.
    pub fn with_block_size(mut self, block_size: usize) -> ExternalSorterBuilder<T, C> {
        self.block_size = block_size;
        return self;
    }

    /// Sets the limit of runs open at once during a merge.
    pub fn with_max_open_runs(mut self, max_open_runs: usize) -> ExternalSorterBuilder<T, C> {
        self.max_open_runs = max_open_runs;
        return self;
    }

    /// Sets accounted size of a single record in bytes.
    pub fn with_record_size(mut self, record_size: u64) -> ExternalSorterBuilder<T, C> {
        self.record_size = record_size;
        return self;
    }

    /// Sets run codec.
    pub fn with_codec<D: RunCodec<T>>(self, codec: D) -> ExternalSorterBuilder<T, D> {
        ExternalSorterBuilder {
            threads_number: self.threads_number,
            tmp_dir: self.tmp_dir,
            rw_buf_size: self.rw_buf_size,
            memory_budget: self.memory_budget,
            block_size: self.block_size,
            max_open_runs: self.max_open_runs,
            record_size: self.record_size,
            codec,
            item_type: PhantomData,
        }
    }
}

impl<T, C> Default for ExternalSorterBuilder<T, C>
where
    T: Ord + Send,
    C: RunCodec<T> + Default,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            block_size: DEFAULT_BLOCK_SIZE,
            max_open_runs: DEFAULT_MAX_OPEN_RUNS,
            record_size: DEFAULT_RECORD_SIZE,
            codec: C::default(),
            item_type: PhantomData,
        }
    }
}

/// External sorter.
pub struct ExternalSorter<T, C = TextCodec<T>>
where
    T: Ord + Send,
    C: RunCodec<T>,
{
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Run file write buffer size.
    rw_buf_size: Option<usize>,
    /// Run read block size in bytes.
    block_size: usize,
    /// Accounted size of a single record in bytes.
    record_size: u64,
    /// Accounted size limit of a generated run.
    run_budget: u64,
    /// Number of runs merged at once.
    fan_in: usize,
    /// Run codec.
    codec: C,

    /// Input item type.
    item_type: PhantomData<fn() -> T>,
}

impl<T, C> ExternalSorter<T, C>
where
    T: Ord + Send,
    C: RunCodec<T>,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort runs in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `rw_buf_size` - Run file write buffer size.
    /// * `memory_budget` - Total working memory limit. A third of it bounds a generated run, the whole of it
    ///   divided by `block_size` bounds the merge fan-in.
    /// * `block_size` - Run read block size.
    /// * `max_open_runs` - Upper limit of the merge fan-in.
    /// * `record_size` - Accounted size of a single record.
    /// * `codec` - Run codec.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
        memory_budget: u64,
        block_size: usize,
        max_open_runs: usize,
        record_size: u64,
        codec: C,
    ) -> Result<Self, SortError> {
        if block_size == 0 {
            return Err(SortError::InvalidConfig("block size must not be zero".to_string()));
        }
        if record_size == 0 {
            return Err(SortError::InvalidConfig("record size must not be zero".to_string()));
        }

        let fan_in = Self::fan_in_for(memory_budget, block_size, max_open_runs);
        if fan_in < 2 {
            return Err(SortError::InvalidConfig(format!(
                "merge fan-in must be at least 2 (memory budget: {}, block size: {}, max open runs: {})",
                memory_budget, block_size, max_open_runs
            )));
        }
        log::info!("merge fan-in: {}", fan_in);

        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            rw_buf_size,
            block_size,
            record_size,
            run_budget: memory_budget / RUN_BUDGET_DIVISOR,
            fan_in,
            codec,
            item_type: PhantomData,
        });
    }

    /// Returns the number of runs merged at once.
    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    /// Returns the accounted size limit of a generated run.
    pub fn run_budget(&self) -> u64 {
        self.run_budget
    }

    fn fan_in_for(memory_budget: u64, block_size: usize, max_open_runs: usize) -> usize {
        let by_budget = memory_budget / block_size as u64;
        if by_budget > max_open_runs as u64 {
            log::debug!(
                "merge fan-in {} capped to {} open runs",
                by_budget,
                max_open_runs
            );
            return max_open_runs;
        }

        return by_budget as usize;
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Sorts data from the input into `destination`.
    /// The destination is only written once sorting succeeded, a failed sort never leaves a result there.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `destination` - Path of the sorted output
    pub fn sort<I, E>(&self, input: I, destination: &Path) -> Result<SortSummary, SortError>
    where
        I: IntoIterator<Item = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        let storage =
            TempDirStorage::new_in(self.tmp_dir.path(), self.rw_buf_size).map_err(|err| SortError::TempDir(err))?;

        let generator = RunGenerator::new(&storage, &self.codec, &self.thread_pool, self.run_budget, self.record_size);
        let runs = generator.generate(input)?;
        let records: u64 = runs.iter().map(|run| run.records()).sum();
        let run_count = runs.len();

        log::debug!("external sort preparation done");

        let scheduler = MergeScheduler::new(&storage, &self.codec, self.fan_in, self.block_size)?;
        let stats = scheduler.run(runs, destination)?;

        return Ok(SortSummary {
            records,
            runs: run_count,
            passes: stats.passes,
            merges: stats.merges,
            max_batch_len: stats.max_batch_len,
        });
    }
}
