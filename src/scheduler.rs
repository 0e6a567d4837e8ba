//! Multi-pass merge scheduling.

use std::marker::PhantomData;
use std::path::Path;

use log;

use crate::codec::RunCodec;
use crate::error::SortError;
use crate::merger::merge_batch;
use crate::run::{Run, RunId, RunStorage, RunWriter};

/// Merge phase statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of merge passes performed.
    pub passes: usize,
    /// Number of merges performed over all passes.
    pub merges: usize,
    /// Largest number of runs merged at once.
    pub max_batch_len: usize,
}

/// Drives the set of live runs (the frontier) down to a single sorted run.
///
/// Each pass splits the frontier into consecutive batches of at most `fan_in` runs and merges every batch
/// into a new run. Runs of a batch are deleted as soon as the batch output is sealed.
pub struct MergeScheduler<'a, T, C, S> {
    storage: &'a S,
    codec: &'a C,
    fan_in: usize,
    block_size: usize,

    item_type: PhantomData<fn() -> T>,
}

impl<'a, T, C, S> MergeScheduler<'a, T, C, S>
where
    T: Ord,
    C: RunCodec<T>,
    S: RunStorage,
{
    /// Creates a merge scheduler.
    ///
    /// # Arguments
    /// * `storage` - Storage holding the runs
    /// * `codec` - Run record encoding
    /// * `fan_in` - Maximum number of runs merged at once, at least 2
    /// * `block_size` - Read block size of every merged run
    pub fn new(storage: &'a S, codec: &'a C, fan_in: usize, block_size: usize) -> Result<Self, SortError> {
        if fan_in < 2 {
            return Err(SortError::InvalidConfig(format!("merge fan-in must be at least 2, got {}", fan_in)));
        }

        return Ok(MergeScheduler {
            storage,
            codec,
            fan_in,
            block_size,
            item_type: PhantomData,
        });
    }

    /// Merges `runs` into a single run and moves it to `destination`.
    /// No runs produce an empty destination file, a single run is moved without merging.
    pub fn run(&self, runs: Vec<Run>, destination: &Path) -> Result<MergeStats, SortError> {
        let mut stats = MergeStats::default();
        let mut frontier = runs;

        while frontier.len() > 1 {
            stats.passes += 1;
            frontier = self.merge_pass(stats.passes, frontier, &mut stats)?;
        }

        let last = match frontier.pop() {
            Some(run) => run,
            None => self.empty_run()?,
        };

        log::debug!("moving {} to {}", last.id(), destination.display());
        self.storage.persist(last.id(), destination)?;

        return Ok(stats);
    }

    fn merge_pass(&self, pass: usize, frontier: Vec<Run>, stats: &mut MergeStats) -> Result<Vec<Run>, SortError> {
        log::debug!(
            "merge pass {} started ({} runs, fan-in {})",
            pass,
            frontier.len(),
            self.fan_in
        );

        let mut reduced = Vec::with_capacity((frontier.len() + self.fan_in - 1) / self.fan_in);
        for (seq, batch) in frontier.chunks(self.fan_in).enumerate() {
            // a lone trailing run has nothing to be merged with
            if let [run] = batch {
                reduced.push(run.clone());
                continue;
            }

            let output = RunId::new(pass, seq);
            let merged = match merge_batch(self.storage, self.codec, batch, output, self.block_size) {
                Ok(merged) => merged,
                Err(err) => {
                    if let Err(err) = self.storage.remove(output) {
                        log::warn!("{} not removed: {}", output, err);
                    }
                    return Err(err);
                }
            };

            for run in batch {
                self.storage.remove(run.id())?;
            }

            stats.merges += 1;
            stats.max_batch_len = stats.max_batch_len.max(batch.len());
            reduced.push(merged);
        }

        log::debug!("merge pass {} done ({} runs left)", pass, reduced.len());

        return Ok(reduced);
    }

    fn empty_run(&self) -> Result<Run, SortError> {
        let id = RunId::new(0, 0);
        let writer = RunWriter::new(id, self.storage.create(id)?);

        return Ok(writer.finish(self.storage)?);
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::{MergeScheduler, MergeStats};
    use crate::codec::TextCodec;
    use crate::error::SortError;
    use crate::run::{Run, RunId, RunStorage, RunWriter, TempDirStorage};

    #[fixture]
    fn storage() -> TempDirStorage {
        TempDirStorage::new_in(&std::env::temp_dir(), None).unwrap()
    }

    fn write_runs(storage: &TempDirStorage, runs: &[Vec<i64>]) -> Vec<Run> {
        let codec = TextCodec::<i64>::new();
        runs.iter()
            .enumerate()
            .map(|(seq, items)| {
                let id = RunId::new(0, seq);
                let mut writer = RunWriter::new(id, storage.create(id).unwrap());
                for item in items {
                    writer.push(&codec, item).unwrap();
                }
                writer.finish(storage).unwrap()
            })
            .collect()
    }

    #[rstest]
    #[case(vec![], 2, "", 0, 0)]
    #[case(vec![vec![7]], 2, "7\n", 0, 0)]
    #[case(vec![vec![3, 5, 8], vec![1, 2, 9]], 2, "1\n2\n3\n5\n8\n9\n", 1, 2)]
    #[case(vec![vec![4], vec![3], vec![2], vec![1], vec![0]], 2, "0\n1\n2\n3\n4\n", 3, 2)]
    #[case(vec![vec![4], vec![3], vec![2], vec![1], vec![0]], 3, "0\n1\n2\n3\n4\n", 2, 3)]
    #[case(vec![vec![4], vec![3], vec![2], vec![1], vec![0]], 8, "0\n1\n2\n3\n4\n", 1, 5)]
    fn test_scheduler(
        storage: TempDirStorage,
        #[case] runs: Vec<Vec<i64>>,
        #[case] fan_in: usize,
        #[case] expected_output: &str,
        #[case] expected_passes: usize,
        #[case] expected_max_batch_len: usize,
    ) {
        let codec = TextCodec::<i64>::new();
        let runs = write_runs(&storage, &runs);
        let out_dir = tempfile::tempdir().unwrap();
        let destination = out_dir.path().join("sorted.txt");

        let scheduler = MergeScheduler::new(&storage, &codec, fan_in, 4).unwrap();
        let stats = scheduler.run(runs, &destination).unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), expected_output);
        assert_eq!(stats.passes, expected_passes);
        assert_eq!(stats.max_batch_len, expected_max_batch_len);
        assert!(stats.max_batch_len <= fan_in);
        assert_eq!(fs::read_dir(storage.path(RunId::new(0, 0)).parent().unwrap()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_single_run_is_moved_without_merging(storage: TempDirStorage) {
        let codec = TextCodec::<i64>::new();
        let runs = write_runs(&storage, &[vec![1, 2, 3]]);
        let out_dir = tempfile::tempdir().unwrap();
        let destination = out_dir.path().join("sorted.txt");

        let stats = MergeScheduler::new(&storage, &codec, 2, 4)
            .unwrap()
            .run(runs, &destination)
            .unwrap();

        assert_eq!(stats, MergeStats::default());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "1\n2\n3\n");
    }

    #[rstest]
    fn test_fan_in_below_two_is_rejected(storage: TempDirStorage) {
        let codec = TextCodec::<i64>::new();

        assert!(matches!(
            MergeScheduler::new(&storage, &codec, 1, 4),
            Err(SortError::InvalidConfig(_))
        ));
    }

    #[rstest]
    fn test_failed_merge_leaves_no_destination(storage: TempDirStorage) {
        let codec = TextCodec::<i64>::new();
        let runs = write_runs(&storage, &[vec![1, 123456789], vec![2]]);
        let out_dir = tempfile::tempdir().unwrap();
        let destination = out_dir.path().join("sorted.txt");

        let result = MergeScheduler::new(&storage, &codec, 2, 4).unwrap().run(runs, &destination);

        assert!(matches!(result, Err(SortError::OversizedRecord { .. })));
        assert!(!destination.exists());
        assert!(!storage.path(RunId::new(1, 0)).exists());
    }
}
