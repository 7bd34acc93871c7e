// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use crate::error::{Result, TraceError};
use crate::event::Event;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, trace};

const TAIL_CHUNK: u64 = 4096;

pub fn is_compressed(path: &Path) -> bool {
    path.to_string_lossy().contains(".gz")
}

/// Lazily decoded events of one log file.
pub struct EventStream {
    name: String,
    reader: Box<dyn BufRead>,
    buf: Vec<u8>,
    line: u64,
    skipped: u64,
}

impl EventStream {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader: Box<dyn BufRead> = if is_compressed(path) {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        debug!(path = %path.display(), compressed = is_compressed(path), "opened trace log");
        Ok(Self::from_reader(path.display().to_string(), reader))
    }

    pub fn from_reader(name: impl Into<String>, reader: impl BufRead + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
            buf: Vec::new(),
            line: 0,
            skipped: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of lines dropped as malformed so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next decodable event, or `None` once the log is exhausted.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|source| TraceError::Read {
                    stream: self.name.clone(),
                    line: self.line,
                    source,
                })?;
            if read == 0 {
                return Ok(None);
            }
            self.line += 1;

            let text = String::from_utf8_lossy(&self.buf);
            match Event::parse(&text) {
                Some(event) => return Ok(Some(event)),
                None => {
                    self.skipped += 1;
                    trace!(stream = %self.name, line = self.line, "skipping malformed line");
                }
            }
        }
    }
}

impl Iterator for EventStream {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

fn leading_timestamp(line: &[u8]) -> Option<u64> {
    let text = String::from_utf8_lossy(line);
    text.split(',').next()?.trim().parse().ok()
}

/// Timestamp of the last line of a log, skipping trailing lines that carry
/// no timestamp. Empty logs end at 0.
pub fn last_timestamp(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let open_err = |source| TraceError::Open {
        path: path.to_path_buf(),
        source,
    };
    let read_err = |source| TraceError::Read {
        stream: path.display().to_string(),
        line: 0,
        source,
    };
    let mut file = File::open(path).map_err(open_err)?;

    if is_compressed(path) {
        let mut reader = BufReader::new(GzDecoder::new(file));
        let mut last = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).map_err(read_err)? == 0 {
                return Ok(last);
            }
            if let Some(timestamp) = leading_timestamp(&buf) {
                last = timestamp;
            }
        }
    }

    tail_timestamp(&mut file).map_err(read_err)
}

fn tail_timestamp<R: Read + Seek>(reader: &mut R) -> std::io::Result<u64> {
    let len = reader.seek(SeekFrom::End(0))?;
    let mut window = TAIL_CHUNK.min(len);
    loop {
        reader.seek(SeekFrom::Start(len - window))?;
        let mut buf = vec![0u8; window as usize];
        reader.read_exact(&mut buf)?;

        let whole_file = window == len;
        let mut lines = buf.split(|byte| *byte == b'\n').rev().peekable();
        while let Some(line) = lines.next() {
            // The first piece of a partial window may start mid-line.
            if lines.peek().is_none() && !whole_file {
                break;
            }
            if let Some(timestamp) = leading_timestamp(line) {
                return Ok(timestamp);
            }
        }

        if whole_file {
            return Ok(0);
        }
        window = (window * 2).min(len);
    }
}

/// Global timeline length: the largest final timestamp among `paths`.
pub fn timeline_length<P: AsRef<Path>>(paths: &[P]) -> Result<u64> {
    let mut length = 0;
    for path in paths {
        let last = last_timestamp(path)?;
        debug!(path = %path.as_ref().display(), last, "read final timestamp");
        length = length.max(last);
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rstest::rstest;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn stream(text: &str) -> EventStream {
        EventStream::from_reader("test", Cursor::new(text.as_bytes().to_vec()))
    }

    #[rstest]
    fn test_skips_noise() {
        let mut events = stream("0,1,n\n12\n5,x,ignored\n10,e,b\nbad,1,s\n20,0,n\n");
        let kinds: Vec<EventKind> = events
            .by_ref()
            .map(|event| event.unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::Start, EventKind::EngineChange, EventKind::Stop]
        );
        assert_eq!(events.skipped(), 3);
    }

    #[rstest]
    fn test_exhausted_is_not_an_error() {
        let mut events = stream("0,1,n");
        assert!(events.next_event().unwrap().is_some());
        assert!(events.next_event().unwrap().is_none());
        assert!(events.next_event().unwrap().is_none());
    }

    #[rstest]
    fn test_tail_skips_partial_last_line() {
        let mut cursor = Cursor::new(b"0,1,n\n150,0,n\ngarbage".to_vec());
        assert_eq!(tail_timestamp(&mut cursor).unwrap(), 150);
    }

    #[rstest]
    fn test_tail_of_empty_input() {
        let mut cursor = Cursor::new(Vec::new());
        assert_eq!(tail_timestamp(&mut cursor).unwrap(), 0);
    }

    #[rstest]
    fn test_tail_spans_several_windows() {
        let mut text = String::new();
        for i in 0..2000 {
            text.push_str(&format!("{},1,s,{},1\n", i, "x".repeat(20)));
        }
        text.push_str("99999,0,n\n");
        text.push_str(&"y".repeat(10_000));
        let mut cursor = Cursor::new(text.into_bytes());
        assert_eq!(tail_timestamp(&mut cursor).unwrap(), 99999);
    }

    #[rstest]
    fn test_gzip_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.log.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"0,1,n\n40,1,g\n90,0,g\n").unwrap();
        encoder.finish().unwrap();

        assert!(is_compressed(&path));
        assert_eq!(last_timestamp(&path).unwrap(), 90);
        let events: Vec<Event> = EventStream::open(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].timestamp, 40);
    }

    #[rstest]
    fn test_timeline_length_is_max_of_logs() {
        let dir = TempDir::new().unwrap();
        let short = dir.path().join("a.log");
        let long = dir.path().join("b.log");
        std::fs::write(&short, "0,1,n\n150,0,n\n").unwrap();
        std::fs::write(&long, "0,1,n\n200,0,n\n").unwrap();
        assert_eq!(timeline_length(&[short, long]).unwrap(), 200);
    }

    #[rstest]
    fn test_missing_file() {
        let err = EventStream::open("/nonexistent/trace.log").err().unwrap();
        assert!(matches!(err, TraceError::Open { .. }));
    }
}
