//! Transparent gzip-or-plain file I/O, shared by every `sap` subcommand.
//!
//! Input files are detected as gzip by extension (`.gz`); decoding happens on
//! a background thread through an anonymous pipe, matching the approach
//! `irma-core` itself uses for its own FASTQ inputs. Output files follow the
//! same convention, and `None` paths fall back to stdout.

use flate2::{Compression, read::MultiGzDecoder, write::GzEncoder};
use std::{
    fs::File,
    io::{BufReader, BufWriter, PipeReader, Read, Stdin, Stdout, Write, stdin, stdout},
    path::Path,
    thread::{self, JoinHandle},
};
use crate::utils::whichever::define_whichever;

define_whichever! {
    #[doc = "Either a plain file or a gzip-decoding pipe, selected by file extension."]
    pub enum ReadFileZip {
        #[doc = "A regular uncompressed file."]
        File(File),
        #[doc = "A gzip stream, decoded on a background thread via an anonymous pipe."]
        Zipped(PipeReader),
    }

    impl Read for ReadFileZip {}
}

define_whichever! {
    #[doc = "Either standard input or a regular file."]
    pub enum ReadFileStdin {
        File(File),
        Stdin(Stdin),
    }

    impl Read for ReadFileStdin {}
}

define_whichever! {
    #[doc = "Either a plain file, a gzip-encoding stream, or standard output."]
    #[derive(Debug)]
    pub enum WriteFileZipStdout {
        #[doc = "A writer for a regular uncompressed file."]
        File(BufWriter<File>),
        #[doc = "A writer for a gzip compressed file."]
        Zipped(GzEncoder<BufWriter<File>>),
        #[doc = "A writer for uncompressed data to stdout."]
        Stdout(BufWriter<Stdout>),
    }

    impl Write for WriteFileZipStdout {}
}

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Opens `path` for buffered, transparently-decompressed reading.
///
/// If `path` ends in `.gz`, a background thread decodes it through an
/// anonymous pipe (see [`spawn_decoder`]); otherwise the file is read
/// directly. The returned [`IoThread`] must eventually be joined (on drop or
/// explicitly) to propagate any decode error.
///
/// ## Errors
///
/// `path` must exist, and if it is gzip-compressed, creation of the pipe must
/// succeed.
pub fn open_input<P: AsRef<Path>>(path: P) -> std::io::Result<(BufReader<ReadFileZip>, Option<IoThread>)> {
    let path = path.as_ref();
    let file = File::open(path)?;

    if is_gz(path) {
        let (pipe, thread) = spawn_decoder(file);
        Ok((BufReader::new(ReadFileZip::Zipped(pipe)), Some(thread)))
    } else {
        Ok((BufReader::new(ReadFileZip::File(file)), None))
    }
}

/// Opens standard input for buffered reading, used when no path is given.
pub fn open_stdin() -> BufReader<ReadFileStdin> {
    BufReader::new(ReadFileStdin::Stdin(stdin()))
}

/// Creates a writer for `path`, or standard output if `path` is `None`.
///
/// A `.gz` extension selects gzip encoding at the default compression level.
///
/// ## Errors
///
/// Creation of `path` must succeed, if given.
pub fn create_output<P: AsRef<Path>>(path: Option<P>) -> std::io::Result<WriteFileZipStdout> {
    let writer = match path {
        Some(p) => {
            let p = p.as_ref();
            let file = BufWriter::new(File::create(p)?);

            if is_gz(p) {
                WriteFileZipStdout::Zipped(GzEncoder::new(file, Compression::default()))
            } else {
                WriteFileZipStdout::File(file)
            }
        }
        None => WriteFileZipStdout::Stdout(BufWriter::new(stdout())),
    };

    Ok(writer)
}

/// Spawns a background thread decoding gzip data from `file` into a pipe.
fn spawn_decoder(file: File) -> (PipeReader, IoThread) {
    let (reader, mut writer) = std::io::pipe().expect("failed to create decode pipe");
    let mut decoder = MultiGzDecoder::new(file);

    let thread = thread::spawn(move || -> std::io::Result<()> {
        std::io::copy(&mut decoder, &mut writer)?;
        Ok(())
    });

    (reader, thread)
}

/// A background I/O thread handle; join it to propagate decode errors.
pub type IoThread = JoinHandle<std::io::Result<()>>;
