//! Line based input record stream.

use std::error::Error;
use std::fmt;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::str::FromStr;

/// Input record reading error.
#[derive(Debug)]
pub enum ParseRecordError {
    /// Input source read error.
    IO(io::Error),
    /// A line is not a valid record.
    Invalid { line: u64, content: String, reason: String },
}

impl Error for ParseRecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            ParseRecordError::IO(err) => Some(err),
            ParseRecordError::Invalid { .. } => None,
        }
    }
}

impl fmt::Display for ParseRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ParseRecordError::IO(err) => write!(f, "input read error: {}", err),
            ParseRecordError::Invalid { line, content, reason } => {
                write!(f, "line {}: {:?} is not a valid record: {}", line, content, reason)
            }
        }
    }
}

/// Reads one record per line. Surrounding whitespace of a line is ignored.
pub struct LineRecords<R, T> {
    lines: io::Lines<R>,
    line: u64,

    item_type: PhantomData<fn() -> T>,
}

impl<R: BufRead, T> LineRecords<R, T> {
    pub fn new(reader: R) -> Self {
        LineRecords {
            lines: reader.lines(),
            line: 0,
            item_type: PhantomData,
        }
    }
}

impl<R, T> Iterator for LineRecords<R, T>
where
    R: BufRead,
    T: FromStr,
    T::Err: fmt::Display,
{
    type Item = Result<T, ParseRecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(err) => return Some(Err(ParseRecordError::IO(err))),
        };
        self.line += 1;

        let content = line.trim();
        return Some(content.parse::<T>().map_err(|err| ParseRecordError::Invalid {
            line: self.line,
            content: content.to_string(),
            reason: err.to_string(),
        }));
    }
}
