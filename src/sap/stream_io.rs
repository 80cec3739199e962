//! Streaming file reader/writer (spec component E).
//!
//! Decouples disk I/O from CPU work with a `BufRead` wrapper that never
//! blocks the caller on decompression ([`crate::io`]'s pipe-based decoder),
//! and a background thread draining an [`mpsc`] channel of completed
//! read-blocks so worker threads never contend on the output file directly.

use crate::sap::{
    aligner::record::{AlignmentRecord, parse_record},
    reference_table::ReferenceTable,
    sequence::{normalize, ReferenceSequence},
};
use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// One read: DNA bases and their per-base ASCII Phred+33 quality string,
/// the same shape (spec §6, "Input file (reads)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub dna: Vec<u8>,
    pub quality: Vec<u8>,
}

/// Iterates two-line `(dna, quality)` pairs out of a reads file.
///
/// Leading blank lines are skipped (spec §4.E: "leading newlines are
/// skipped"). A dangling final DNA line with no quality line is dropped and
/// counted in [`ReadPairs::skipped`] rather than surfaced as an error,
/// matching §7's "parse error in records/reads: skip the offending read;
/// count and report totals".
pub struct ReadPairs<R> {
    lines: std::io::Lines<R>,
    skipped: usize,
}

impl<R: BufRead> ReadPairs<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            skipped: 0,
        }
    }

    /// Number of trailing unpaired lines dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn next_nonblank(&mut self) -> Option<std::io::Result<String>> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.is_empty() => continue,
                other => return Some(other),
            }
        }
    }
}

impl<R: BufRead> Iterator for ReadPairs<R> {
    type Item = std::io::Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let dna = match self.next_nonblank()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };

        match self.lines.next() {
            Some(Ok(quality)) => {
                let mut dna = dna.into_bytes();
                normalize(&mut dna);
                Some(Ok(ReadRecord {
                    dna,
                    quality: quality.into_bytes(),
                }))
            }
            Some(Err(e)) => Some(Err(e)),
            None => {
                self.skipped += 1;
                None
            }
        }
    }
}

/// Iterates complete read-blocks out of an alignment-record stream (spec §6,
/// "Alignment output stream"): a DNA line, a quality line, zero or more
/// tab-separated records, then a blank line.
///
/// A block whose record lines fail to parse is skipped and counted, mirroring
/// §7's parse-error policy; a dangling trailing DNA/quality pair with no
/// terminating blank line is dropped like [`ReadPairs`] does.
pub struct AlignmentBlocks<R> {
    lines: std::io::Lines<R>,
    skipped: usize,
}

impl<R: BufRead> AlignmentBlocks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            skipped: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for AlignmentBlocks<R> {
    type Item = std::io::Result<(ReadRecord, Vec<AlignmentRecord>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let dna = loop {
            match self.lines.next()? {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => break line,
                Err(e) => return Some(Err(e)),
            }
        };

        let quality = match self.lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Some(Err(e)),
            None => {
                self.skipped += 1;
                return None;
            }
        };

        let mut records = Vec::new();
        loop {
            match self.lines.next() {
                Some(Ok(line)) if line.is_empty() => break,
                Some(Ok(line)) => match parse_record(&line) {
                    Some(record) => records.push(record),
                    None => self.skipped += 1,
                },
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }

        Some(Ok((
            ReadRecord {
                dna: dna.into_bytes(),
                quality: quality.into_bytes(),
            },
            records,
        )))
    }
}

/// Reads a reference file (name line, DNA line, repeating) into a fresh
/// [`ReferenceTable`] (spec §6, "Input file (reference)").
///
/// ## Errors
///
/// Propagates I/O errors from `reader`. A dangling trailing name line with no
/// DNA line is silently dropped, matching [`ReadPairs`]'s treatment of
/// incomplete trailing records.
pub fn read_reference_file<R: BufRead>(reader: R) -> std::io::Result<ReferenceTable> {
    let mut table = ReferenceTable::new();
    let mut lines = reader.lines();

    loop {
        let name = loop {
            match lines.next() {
                Some(Ok(line)) if line.is_empty() => continue,
                Some(Ok(line)) => break line,
                Some(Err(e)) => return Err(e),
                None => return Ok(table),
            }
        };

        let dna = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(e),
            None => return Ok(table),
        };

        let sequence = ReferenceSequence::new(name, dna.into_bytes());
        // Reference names are assumed unique per spec §3; a duplicate aborts
        // the load rather than silently dropping one of the sequences.
        if let Err(dup) = table.insert(sequence) {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, dup.to_string()));
        }
    }
}

/// Errors a [`BlockWriter`] can surface back to its caller.
#[derive(Debug)]
pub enum WriterError {
    Io(std::io::Error),
    ReceiverDeallocated,
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Io(e) => write!(f, "{e}"),
            WriterError::ReceiverDeallocated => write!(f, "writer thread is no longer receiving blocks"),
        }
    }
}

impl std::error::Error for WriterError {}

impl From<std::io::Error> for WriterError {
    fn from(value: std::io::Error) -> Self {
        WriterError::Io(value)
    }
}

/// A clonable, multi-producer block writer backed by one background thread
/// (spec §4.E's writer contract, §4.H's "hand the current bytes to the
/// writer in one call").
///
/// Each [`write_block`](Self::write_block) call sends one fully-formed output
/// block (one read's framed record, spec §4.G's "Output framing") down an
/// [`mpsc`] channel; the background thread writes blocks to the destination
/// in receipt order. Cloning shares the channel, matching how worker threads
/// in the pool each hold their own handle.
pub struct BlockWriter {
    sender: mpsc::Sender<String>,
    thread: Option<JoinHandle<std::io::Result<()>>>,
}

impl Clone for BlockWriter {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            thread: None,
        }
    }
}

impl BlockWriter {
    /// Spawns the background thread, moving `writer` onto it.
    pub fn from_writer<W: Write + Send + 'static>(mut writer: W) -> Self {
        let (sender, receiver) = mpsc::channel::<String>();
        let thread = thread::spawn(move || -> std::io::Result<()> {
            while let Ok(block) = receiver.recv() {
                writer.write_all(block.as_bytes())?;
            }
            writer.flush()
        });

        Self {
            sender,
            thread: Some(thread),
        }
    }

    /// Sends one block to the writer thread.
    ///
    /// ## Errors
    ///
    /// If the background thread has exited, the underlying I/O error is
    /// returned when it can be recovered by joining; otherwise
    /// [`WriterError::ReceiverDeallocated`] is returned.
    pub fn write_block(&mut self, block: String) -> Result<(), WriterError> {
        self.sender.send(block).map_err(|_| {
            if let Some(thread) = self.thread.take() {
                match thread.join().expect("writer thread panicked") {
                    Err(e) => WriterError::Io(e),
                    Ok(()) => WriterError::ReceiverDeallocated,
                }
            } else {
                WriterError::ReceiverDeallocated
            }
        })
    }

    /// Drains the channel and joins the background thread, propagating any
    /// I/O error it encountered. Must be called on the original (non-cloned)
    /// writer to observe the result.
    pub fn flush(self) -> std::io::Result<()> {
        if let Some(thread) = self.thread {
            drop(self.sender);
            thread.join().expect("writer thread panicked")
        } else {
            Ok(())
        }
    }
}

/// Formats one read's output block (spec §4.G "Output framing"): the DNA and
/// quality lines, one line per accepted alignment record, then a trailing
/// blank line.
pub fn format_block(read: &ReadRecord, records: &[crate::sap::aligner::record::AlignmentRecord]) -> String {
    let mut block = String::new();
    block.push_str(std::str::from_utf8(&read.dna).unwrap_or(""));
    block.push('\n');
    block.push_str(std::str::from_utf8(&read.quality).unwrap_or(""));
    block.push('\n');
    for record in records {
        block.push_str(&record.to_string());
        block.push('\n');
    }
    block.push('\n');
    block
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_pairs_skips_leading_blank_lines() {
        let data = b"\n\nacgt\nIIII\n".to_vec();
        let mut pairs = ReadPairs::new(Cursor::new(data));
        let record = pairs.next().unwrap().unwrap();
        assert_eq!(record.dna, b"acgt");
        assert_eq!(record.quality, b"IIII");
        assert!(pairs.next().is_none());
        assert_eq!(pairs.skipped(), 0);
    }

    #[test]
    fn read_pairs_drops_dangling_trailing_line() {
        let data = b"acgt\nIIII\nggg\n".to_vec();
        let mut pairs = ReadPairs::new(Cursor::new(data));
        assert!(pairs.next().unwrap().is_ok());
        assert!(pairs.next().is_none());
        assert_eq!(pairs.skipped(), 1);
    }

    #[test]
    fn reference_file_round_trips_name_and_dna() {
        let data = b"ref1\nacgtacgt\nref2\nggcc\n".to_vec();
        let table = read_reference_file(Cursor::new(data)).unwrap();
        assert_eq!(table.len(), 2);
        let id1 = table.id_of("ref1").unwrap();
        assert_eq!(table.get(id1).unwrap().sequence.bytes(), b"acgtacgt");
    }

    #[test]
    fn block_writer_preserves_all_sent_blocks() {
        let dest = Vec::new();
        let mut writer = BlockWriter::from_writer(std::io::Cursor::new(dest));
        writer.write_block("a\n".into()).unwrap();
        writer.write_block("b\n".into()).unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn format_block_ends_with_blank_line() {
        let read = ReadRecord {
            dna: b"acgt".to_vec(),
            quality: b"IIII".to_vec(),
        };
        let block = format_block(&read, &[]);
        assert_eq!(block, "acgt\nIIII\n\n");
    }

    #[test]
    fn alignment_blocks_round_trip_formatted_output() {
        let record = AlignmentRecord {
            ref_name: "ref1".into(),
            direction: crate::sap::aligner::record::Direction::Forward,
            read_start: 0,
            ref_start: 0,
            score: 1.0,
            ops: "nnnn".parse().unwrap(),
        };
        let read = ReadRecord {
            dna: b"acgt".to_vec(),
            quality: b"IIII".to_vec(),
        };
        let block = format_block(&read, std::slice::from_ref(&record));

        let mut blocks = AlignmentBlocks::new(Cursor::new(block.into_bytes()));
        let (parsed_read, parsed_records) = blocks.next().unwrap().unwrap();
        assert_eq!(parsed_read, read);
        assert_eq!(parsed_records.len(), 1);
        assert_eq!(parsed_records[0].ref_name, "ref1");
        assert!(blocks.next().is_none());
    }
}
