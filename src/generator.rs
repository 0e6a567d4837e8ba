//! Sorted run generation.

use std::error::Error;
use std::marker::PhantomData;

use log;
use rayon::slice::ParallelSliceMut;

use crate::buffer::RunBuffer;
use crate::codec::RunCodec;
use crate::error::SortError;
use crate::run::{Run, RunId, RunStorage, RunWriter};

/// Splits an input stream into sorted runs that each fit a memory budget.
pub struct RunGenerator<'a, T, C, S> {
    storage: &'a S,
    codec: &'a C,
    thread_pool: &'a rayon::ThreadPool,
    budget: u64,
    record_size: u64,

    item_type: PhantomData<fn() -> T>,
}

impl<'a, T, C, S> RunGenerator<'a, T, C, S>
where
    T: Ord + Send,
    C: RunCodec<T>,
    S: RunStorage,
{
    /// Creates a run generator.
    ///
    /// # Arguments
    /// * `storage` - Storage new runs are written to
    /// * `codec` - Run record encoding
    /// * `thread_pool` - Pool in-memory sorting is run on
    /// * `budget` - Maximum accounted size of a run in bytes
    /// * `record_size` - Accounted size of a single record in bytes
    pub fn new(
        storage: &'a S,
        codec: &'a C,
        thread_pool: &'a rayon::ThreadPool,
        budget: u64,
        record_size: u64,
    ) -> Self {
        RunGenerator {
            storage,
            codec,
            thread_pool,
            budget,
            record_size,
            item_type: PhantomData,
        }
    }

    /// Consumes the input and returns the generated runs in creation order.
    /// Empty input produces no runs. On failure every run written so far is deleted.
    pub fn generate<I, E>(&self, input: I) -> Result<Vec<Run>, SortError>
    where
        I: IntoIterator<Item = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        let mut runs = Vec::new();

        if let Err(err) = self.fill_runs(input, &mut runs) {
            for run in &runs {
                if let Err(err) = self.storage.remove(run.id()) {
                    log::warn!("{} not removed: {}", run.id(), err);
                }
            }
            return Err(err);
        }

        log::debug!("run generation done ({} runs)", runs.len());

        return Ok(runs);
    }

    fn fill_runs<I, E>(&self, input: I, runs: &mut Vec<Run>) -> Result<(), SortError>
    where
        I: IntoIterator<Item = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        let mut buffer = RunBuffer::new(self.budget, self.record_size);

        for item in input.into_iter() {
            let item = item.map_err(|err| SortError::Parse(Box::new(err)))?;

            if buffer.is_full() {
                let full = std::mem::replace(&mut buffer, RunBuffer::new(self.budget, self.record_size));
                runs.push(self.create_run(RunId::new(0, runs.len()), full)?);
            }
            buffer.push(item);
        }

        if !buffer.is_empty() {
            runs.push(self.create_run(RunId::new(0, runs.len()), buffer)?);
        }

        return Ok(());
    }

    fn create_run(&self, id: RunId, mut buffer: RunBuffer<T>) -> Result<Run, SortError> {
        log::debug!("sorting {} data ({} records) ...", id, buffer.len());
        self.thread_pool.install(|| {
            buffer.par_sort_unstable();
        });

        log::debug!("saving {} data", id);
        let mut writer = RunWriter::new(id, self.storage.create(id)?);
        for item in &buffer {
            writer.push(self.codec, item)?;
        }

        return Ok(writer.finish(self.storage)?);
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::fs;
    use std::io;

    use rstest::*;

    use super::RunGenerator;
    use crate::codec::{RunCodec, TextCodec};
    use crate::error::SortError;
    use crate::run::{Run, RunId, TempDirStorage};

    #[fixture]
    fn storage() -> TempDirStorage {
        TempDirStorage::new_in(&std::env::temp_dir(), None).unwrap()
    }

    #[fixture]
    fn thread_pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn read_run(storage: &TempDirStorage, run: &Run) -> Vec<i64> {
        let codec = TextCodec::<i64>::new();
        let mut items = VecDeque::new();
        codec
            .decode_block(&fs::read(storage.path(run.id())).unwrap(), &mut items)
            .unwrap();
        Vec::from(items)
    }

    fn ok_input(items: &[i64]) -> Vec<Result<i64, io::Error>> {
        items.iter().map(|&item| Ok(item)).collect()
    }

    #[rstest]
    #[case(vec![], 120, vec![])]
    #[case(vec![7], 120, vec![vec![7]])]
    #[case(vec![5, 3, 8, 1, 9, 2], 120, vec![vec![3, 5, 8], vec![1, 2, 9]])]
    #[case(vec![4, 1, 3, 2, 0, 6], 80, vec![vec![1, 4], vec![2, 3], vec![0, 6]])]
    #[case(vec![2, 1, 3], 10, vec![vec![2], vec![1], vec![3]])]
    #[case(vec![3, 3, 1], 4000, vec![vec![1, 3, 3]])]
    fn test_generate_runs(
        storage: TempDirStorage,
        thread_pool: rayon::ThreadPool,
        #[case] input: Vec<i64>,
        #[case] budget: u64,
        #[case] expected: Vec<Vec<i64>>,
    ) {
        let codec = TextCodec::<i64>::new();
        let generator = RunGenerator::new(&storage, &codec, &thread_pool, budget, 40);

        let runs = generator.generate(ok_input(&input)).unwrap();

        let actual: Vec<Vec<i64>> = runs.iter().map(|run| read_run(&storage, run)).collect();
        assert_eq!(actual, expected);
        for run in &runs {
            assert!(run.records() * 40 <= budget || run.records() == 1);
        }
    }

    #[rstest]
    fn test_parse_error_aborts_and_cleans_up(storage: TempDirStorage, thread_pool: rayon::ThreadPool) {
        let codec = TextCodec::<i64>::new();
        let generator = RunGenerator::new(&storage, &codec, &thread_pool, 80, 40);

        let input = vec![
            Ok(1),
            Ok(2),
            Ok(3),
            Err(io::Error::new(io::ErrorKind::InvalidData, "not a number")),
            Ok(4),
        ];

        let result = generator.generate(input);
        assert!(matches!(result, Err(SortError::Parse(_))));
        assert!(!storage.path(RunId::new(0, 0)).exists());
    }
}
