//! Memory accounted run buffer.

use rayon;

/// Buffer limited by the accounted size of its records.
///
/// Every record is accounted with the same fixed size, so the buffer size is `len * record_size`
/// rather than a measurement of the actual memory in use.
pub struct RunBuffer<T> {
    limit: u64,
    record_size: u64,
    inner: Vec<T>,
}

impl<T> RunBuffer<T> {
    /// Creates a new buffer.
    ///
    /// # Arguments
    /// * `limit` - Buffer size limit in bytes
    /// * `record_size` - Accounted size of a single record in bytes
    pub fn new(limit: u64, record_size: u64) -> Self {
        RunBuffer {
            limit,
            record_size,
            inner: Vec::new(),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    /// Returns buffer length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the accounted buffer size in bytes.
    pub fn mem_size(&self) -> u64 {
        self.inner.len() as u64 * self.record_size
    }

    /// Checks if one more record would take the buffer over the limit.
    /// An empty buffer always admits a record, even one larger than the limit.
    pub fn is_full(&self) -> bool {
        !self.inner.is_empty() && self.mem_size() + self.record_size > self.limit
    }
}

impl<T> IntoIterator for RunBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a RunBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<T: Send> rayon::slice::ParallelSliceMut<T> for RunBuffer<T> {
    fn as_parallel_slice_mut(&mut self) -> &mut [T] {
        self.inner.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::RunBuffer;

    #[test]
    fn test_run_buffer() {
        let mut buffer = RunBuffer::new(120, 40);

        buffer.push(0);
        assert_eq!(buffer.is_full(), false);
        buffer.push(1);
        assert_eq!(buffer.is_full(), false);
        buffer.push(2);
        assert_eq!(buffer.is_full(), true);
        assert_eq!(buffer.mem_size(), 120);

        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![0, 1, 2]);
    }

    #[rstest]
    #[case(10)]
    #[case(0)]
    fn test_oversized_record_is_admitted_alone(#[case] limit: u64) {
        let mut buffer = RunBuffer::new(limit, 40);
        assert_eq!(buffer.is_full(), false);

        buffer.push(7);
        assert_eq!(buffer.is_full(), true);
    }
}
