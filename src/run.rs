//! Sorted runs and the storage they live in.

use std::fmt;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use log;
use tempfile;

use crate::codec::RunCodec;

/// Run identifier. Allocated by whoever owns the set of live runs.
///
/// Pass `0` is run generation, pass `p` is the `p`-th merge pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RunId {
    pass: usize,
    seq: usize,
}

impl RunId {
    pub fn new(pass: usize, seq: usize) -> Self {
        RunId { pass, seq }
    }

    pub fn pass(&self) -> usize {
        self.pass
    }

    pub fn seq(&self) -> usize {
        self.seq
    }

    /// File name of the run inside its storage directory.
    pub fn file_name(&self) -> String {
        format!("run-{}-{}", self.pass, self.seq)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}-{}", self.pass, self.seq)
    }
}

/// A completely written, sorted run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    id: RunId,
    records: u64,
    bytes: u64,
}

impl Run {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Number of records in the run.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Serialized size of the run in bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Run storage interface.
///
/// Runs are written once through [`RunStorage::create`], sealed with [`RunStorage::finish`] and read back
/// sequentially through [`RunStorage::open`].
pub trait RunStorage {
    type Writer: Write;
    type Reader: Read + Seek;

    /// Creates a new empty run for appending.
    fn create(&self, id: RunId) -> io::Result<Self::Writer>;

    /// Flushes a run writer and makes the written data durable.
    fn finish(&self, writer: Self::Writer) -> io::Result<()>;

    /// Opens a run for reading from its beginning.
    fn open(&self, id: RunId) -> io::Result<Self::Reader>;

    /// Deletes a run. Deleting a run that does not exist is not an error.
    fn remove(&self, id: RunId) -> io::Result<()>;

    /// Moves a run out of the storage to `destination`.
    fn persist(&self, id: RunId, destination: &Path) -> io::Result<()>;
}

/// Run storage backed by a private temporary directory.
/// The directory and every run still in it are removed when the storage is dropped.
pub struct TempDirStorage {
    dir: tempfile::TempDir,
    rw_buf_size: Option<usize>,
}

impl TempDirStorage {
    /// Creates a storage directory inside `parent`.
    ///
    /// # Arguments
    /// * `parent` - Directory the storage directory is created in
    /// * `rw_buf_size` - Run write buffer size. If the parameter is [`None`] the default buffer size is used.
    pub fn new_in(parent: &Path, rw_buf_size: Option<usize>) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("kway-sort").tempdir_in(parent)?;
        log::debug!("run storage created at {}", dir.path().display());

        return Ok(TempDirStorage { dir, rw_buf_size });
    }

    /// Returns the file path of a run.
    pub fn path(&self, id: RunId) -> PathBuf {
        self.dir.path().join(id.file_name())
    }

    fn copy_out(&self, id: RunId, destination: &Path) -> io::Result<()> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut source = fs::File::open(self.path(id))?;
        let mut target = tempfile::NamedTempFile::new_in(parent)?;
        io::copy(&mut source, target.as_file_mut())?;
        target.as_file().sync_all()?;
        target.persist(destination).map_err(|err| err.error)?;

        return self.remove(id);
    }
}

impl RunStorage for TempDirStorage {
    type Writer = io::BufWriter<fs::File>;
    type Reader = fs::File;

    fn create(&self, id: RunId) -> io::Result<Self::Writer> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(id))?;

        return Ok(match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        });
    }

    fn finish(&self, writer: Self::Writer) -> io::Result<()> {
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()
    }

    fn open(&self, id: RunId) -> io::Result<Self::Reader> {
        fs::File::open(self.path(id))
    }

    fn remove(&self, id: RunId) -> io::Result<()> {
        match fs::remove_file(self.path(id)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    fn persist(&self, id: RunId, destination: &Path) -> io::Result<()> {
        if let Err(err) = fs::rename(self.path(id), destination) {
            // most likely a destination on another file system
            log::debug!("rename of {} failed ({}), copying instead", id, err);
            return self.copy_out(id, destination);
        }

        return Ok(());
    }
}

/// Appends encoded records to a run, counting what has been written.
pub struct RunWriter<W: Write> {
    id: RunId,
    inner: W,
    records: u64,
    bytes: u64,
}

impl<W: Write> RunWriter<W> {
    pub fn new(id: RunId, inner: W) -> Self {
        RunWriter {
            id,
            inner,
            records: 0,
            bytes: 0,
        }
    }

    /// Appends a single record.
    pub fn push<T, C: RunCodec<T>>(&mut self, codec: &C, item: &T) -> io::Result<()> {
        codec.encode(self, item)?;
        self.records += 1;

        return Ok(());
    }

    /// Seals the run in `storage`.
    pub fn finish<S>(self, storage: &S) -> io::Result<Run>
    where
        S: RunStorage<Writer = W>,
    {
        storage.finish(self.inner)?;

        return Ok(Run {
            id: self.id,
            records: self.records,
            bytes: self.bytes,
        });
    }
}

impl<W: Write> Write for RunWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;

        return Ok(written);
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::prelude::*;

    use rstest::*;

    use super::{RunId, RunStorage, RunWriter, TempDirStorage};
    use crate::codec::TextCodec;

    #[fixture]
    fn storage() -> TempDirStorage {
        TempDirStorage::new_in(&std::env::temp_dir(), None).unwrap()
    }

    #[rstest]
    fn test_run_writer_counts(storage: TempDirStorage) {
        let id = RunId::new(0, 0);
        let codec = TextCodec::<i64>::new();

        let mut writer = RunWriter::new(id, storage.create(id).unwrap());
        for item in [3, -10, 250] {
            writer.push(&codec, &item).unwrap();
        }
        let run = writer.finish(&storage).unwrap();

        assert_eq!(run.id(), id);
        assert_eq!(run.records(), 3);
        assert_eq!(run.bytes(), "3\n-10\n250\n".len() as u64);

        let mut content = String::new();
        storage.open(id).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "3\n-10\n250\n");
    }

    #[rstest]
    fn test_create_refuses_existing_run(storage: TempDirStorage) {
        let id = RunId::new(1, 4);
        storage.create(id).unwrap();

        assert!(storage.create(id).is_err());
    }

    #[rstest]
    fn test_remove_is_idempotent(storage: TempDirStorage) {
        let id = RunId::new(2, 0);
        storage.finish(storage.create(id).unwrap()).unwrap();

        storage.remove(id).unwrap();
        storage.remove(id).unwrap();
        assert!(!storage.path(id).exists());
    }

    #[rstest]
    fn test_persist_moves_run(storage: TempDirStorage) {
        let id = RunId::new(0, 7);
        let mut writer = storage.create(id).unwrap();
        writer.write_all(b"1\n2\n").unwrap();
        storage.finish(writer).unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let destination = out_dir.path().join("sorted.txt");
        storage.persist(id, &destination).unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), "1\n2\n");
        assert!(!storage.path(id).exists());
    }
}
