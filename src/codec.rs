//! Run record encodings.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::str::FromStr;

use rmp_serde;
use serde;

/// Record decoding error.
pub type DecodeError = Box<dyn Error + Send + Sync>;

/// Run codec interface. Defines how records are laid out in a run.
pub trait RunCodec<T>: Send + Sync {
    /// Appends a single encoded record to the writer.
    fn encode<W: Write>(&self, writer: &mut W, item: &T) -> io::Result<()>;

    /// Returns the length of the longest prefix of `block` made of complete records.
    ///
    /// # Arguments
    /// * `block` - Raw bytes read from a run starting at a record boundary
    /// * `at_eof` - `true` if no data follows the block in the run
    fn record_boundary(&self, block: &[u8], at_eof: bool) -> Result<usize, DecodeError>;

    /// Decodes every record of a record-aligned block into `out`.
    fn decode_block(&self, block: &[u8], out: &mut VecDeque<T>) -> Result<(), DecodeError>;
}

/// Line based text codec: one record per line in its `Display` form.
pub struct TextCodec<T> {
    item_type: PhantomData<fn() -> T>,
}

impl<T> TextCodec<T> {
    pub fn new() -> Self {
        TextCodec { item_type: PhantomData }
    }
}

impl<T> Default for TextCodec<T> {
    fn default() -> Self {
        TextCodec::new()
    }
}

impl<T> Clone for TextCodec<T> {
    fn clone(&self) -> Self {
        TextCodec::new()
    }
}

impl<T> RunCodec<T> for TextCodec<T>
where
    T: FromStr + Display,
    T::Err: Error + Send + Sync + 'static,
{
    fn encode<W: Write>(&self, writer: &mut W, item: &T) -> io::Result<()> {
        writeln!(writer, "{}", item)
    }

    fn record_boundary(&self, block: &[u8], at_eof: bool) -> Result<usize, DecodeError> {
        // an unterminated last line is still a whole record
        if at_eof {
            return Ok(block.len());
        }

        return Ok(block.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1));
    }

    fn decode_block(&self, block: &[u8], out: &mut VecDeque<T>) -> Result<(), DecodeError> {
        let text = std::str::from_utf8(block)?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            out.push_back(line.parse::<T>()?);
        }

        return Ok(());
    }
}

/// RMP (Rust MessagePack) codec.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpCodec<T> {
    item_type: PhantomData<fn() -> T>,
}

impl<T> RmpCodec<T> {
    pub fn new() -> Self {
        RmpCodec { item_type: PhantomData }
    }
}

impl<T> Default for RmpCodec<T> {
    fn default() -> Self {
        RmpCodec::new()
    }
}

impl<T> Clone for RmpCodec<T> {
    fn clone(&self) -> Self {
        RmpCodec::new()
    }
}

impl<T> RmpCodec<T>
where
    T: serde::de::DeserializeOwned,
{
    fn is_truncated(err: &rmp_serde::decode::Error) -> bool {
        match err {
            rmp_serde::decode::Error::InvalidMarkerRead(err) | rmp_serde::decode::Error::InvalidDataRead(err) => {
                err.kind() == io::ErrorKind::UnexpectedEof
            }
            _ => false,
        }
    }
}

impl<T> RunCodec<T> for RmpCodec<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    fn encode<W: Write>(&self, writer: &mut W, item: &T) -> io::Result<()> {
        rmp_serde::encode::write(writer, item).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    fn record_boundary(&self, block: &[u8], _at_eof: bool) -> Result<usize, DecodeError> {
        let mut cursor = io::Cursor::new(block);

        loop {
            let boundary = cursor.position() as usize;
            if boundary == block.len() {
                return Ok(boundary);
            }

            if let Err(err) = rmp_serde::decode::from_read::<_, T>(&mut cursor) {
                if Self::is_truncated(&err) {
                    return Ok(boundary);
                }
                return Err(Box::new(err));
            }
        }
    }

    fn decode_block(&self, block: &[u8], out: &mut VecDeque<T>) -> Result<(), DecodeError> {
        let mut cursor = io::Cursor::new(block);
        while (cursor.position() as usize) < block.len() {
            out.push_back(rmp_serde::decode::from_read(&mut cursor)?);
        }

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use rstest::*;

    use super::{RmpCodec, RunCodec, TextCodec};

    fn encode_all<C: RunCodec<i64>>(codec: &C, items: &[i64]) -> Vec<u8> {
        let mut buf = Vec::new();
        for item in items {
            codec.encode(&mut buf, item).unwrap();
        }
        buf
    }

    #[rstest]
    #[case(b"12\n7\n", false, 5)]
    #[case(b"12\n7", false, 3)]
    #[case(b"12\n7", true, 4)]
    #[case(b"1234", false, 0)]
    #[case(b"", true, 0)]
    fn test_text_boundary(#[case] block: &[u8], #[case] at_eof: bool, #[case] expected: usize) {
        let codec = TextCodec::<i64>::new();
        assert_eq!(codec.record_boundary(block, at_eof).unwrap(), expected);
    }

    #[test]
    fn test_text_decode_skips_blank_lines() {
        let codec = TextCodec::<i64>::new();
        let mut out = VecDeque::new();

        codec.decode_block(b"5\n\n -3 \n9\n", &mut out).unwrap();

        assert_eq!(Vec::from(out), vec![5, -3, 9]);
    }

    #[test]
    fn test_text_decode_rejects_garbage() {
        let codec = TextCodec::<i64>::new();
        let mut out = VecDeque::new();

        assert!(codec.decode_block(b"5\nfive\n", &mut out).is_err());
    }

    #[test]
    fn test_rmp_boundary_stops_before_partial_record() {
        let codec = RmpCodec::<i64>::new();
        let items = [1, 1_000, -70_000, i64::MAX];
        let encoded = encode_all(&codec, &items);

        let whole = codec.record_boundary(&encoded, true).unwrap();
        assert_eq!(whole, encoded.len());

        // cut inside the last record, which takes 9 bytes
        let cut = &encoded[..encoded.len() - 4];
        let boundary = codec.record_boundary(cut, false).unwrap();
        assert_eq!(boundary, encoded.len() - 9);

        let mut out = VecDeque::new();
        codec.decode_block(&cut[..boundary], &mut out).unwrap();
        assert_eq!(Vec::from(out), vec![1, 1_000, -70_000]);
    }

    #[test]
    fn test_rmp_boundary_rejects_foreign_data() {
        let codec = RmpCodec::<i64>::new();

        // a msgpack string where an integer is expected
        assert!(codec.record_boundary(&[0xa1, b'x'], false).is_err());
    }
}
