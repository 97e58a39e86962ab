//---------------------------------------------------------
// Copyright 2022 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use bio::stats::{Prob, PHREDProb};
use flate2::read::MultiGzDecoder;
#[cfg(test)]
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::errors::{Result, VarcallError};

// Scores are capped here, the same cap used for somatic scores in VCF output
const MAX_PHRED: f64 = 255.0;

pub fn phred_score(p: f64) -> f64 {
    if p <= 0.0 {
        return MAX_PHRED;
    }
    let q = *PHREDProb::from(Prob(p.min(1.0)));
    return q.max(0.0).min(MAX_PHRED);
}

//
// A source of pileup lines. Sources that can be read again from the start
// support rewind, which the stream synchronizer needs for the normal sample.
//
pub trait LineSource {
    fn next_line(& mut self) -> Result<Option<String>>;

    fn rewind(& mut self) -> Result<()>;

    // a short name for log messages
    fn name(&self) -> String;
}

fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_gz = path.extension().map(|e| e == "gz").unwrap_or(false);
    if is_gz {
        return Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))));
    }
    return Ok(Box::new(BufReader::new(file)));
}

// Read one line without its terminator. A line that is not valid UTF-8 is
// consumed and reported as a malformed record so the caller can skip it.
fn read_trimmed_line(reader: & mut dyn BufRead, line_number: & mut u64) -> Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', & mut buf)? == 0 {
        return Ok(None);
    }
    *line_number += 1;
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    match String::from_utf8(buf) {
        Ok(line) => return Ok(Some(line)),
        Err(_) => return Err(VarcallError::malformed(*line_number, "invalid UTF-8"))
    }
}

// Lines of a plain or gzip compressed file
pub struct FileLineSource
{
    path: PathBuf,
    reader: Option<Box<dyn BufRead>>,
    lines_read: u64
}

impl FileLineSource {
    pub fn open(path: &Path) -> Result<FileLineSource> {
        let reader = open_reader(path)?;
        return Ok(FileLineSource { path: path.to_path_buf(), reader: Some(reader), lines_read: 0 });
    }
}

impl LineSource for FileLineSource {
    fn next_line(& mut self) -> Result<Option<String>> {
        match self.reader.as_mut() {
            Some(r) => return read_trimmed_line(r.as_mut(), & mut self.lines_read),
            None => return Ok(None)
        }
    }

    fn rewind(& mut self) -> Result<()> {
        // close the current handle before opening a new one
        self.reader = None;
        self.reader = Some(open_reader(&self.path)?);
        self.lines_read = 0;
        return Ok(());
    }

    fn name(&self) -> String {
        return self.path.display().to_string();
    }
}

// Lines read from standard input, which cannot be rewound
pub struct StdinLineSource
{
    reader: BufReader<io::Stdin>,
    lines_read: u64
}

impl StdinLineSource {
    pub fn new() -> StdinLineSource {
        return StdinLineSource { reader: BufReader::new(io::stdin()), lines_read: 0 };
    }
}

impl LineSource for StdinLineSource {
    fn next_line(& mut self) -> Result<Option<String>> {
        return read_trimmed_line(& mut self.reader, & mut self.lines_read);
    }

    fn rewind(& mut self) -> Result<()> {
        return Err(io::Error::new(io::ErrorKind::Unsupported, "standard input cannot be rewound").into());
    }

    fn name(&self) -> String {
        return "stdin".to_owned();
    }
}

// Lines held in memory
#[cfg(test)]
pub struct MemoryLineSource
{
    lines: Vec<String>,
    pending: VecDeque<String>
}

#[cfg(test)]
impl MemoryLineSource {
    pub fn new(lines: &[&str]) -> MemoryLineSource {
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        let pending = lines.iter().cloned().collect();
        return MemoryLineSource { lines: lines, pending: pending };
    }
}

#[cfg(test)]
impl LineSource for MemoryLineSource {
    fn next_line(& mut self) -> Result<Option<String>> {
        return Ok(self.pending.pop_front());
    }

    fn rewind(& mut self) -> Result<()> {
        self.pending = self.lines.iter().cloned().collect();
        return Ok(());
    }

    fn name(&self) -> String {
        return "memory".to_owned();
    }
}

// Open a path as a line source, "-" reads standard input
pub fn open_line_source(path: &str) -> Result<Box<dyn LineSource>> {
    if path == "-" {
        return Ok(Box::new(StdinLineSource::new()));
    }
    return Ok(Box::new(FileLineSource::open(Path::new(path))?));
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(& mut self) -> Result<Option<String>> {
        return (**self).next_line();
    }

    fn rewind(& mut self) -> Result<()> {
        return (**self).rewind();
    }

    fn name(&self) -> String {
        return (**self).name();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_phred_score() {
        assert_abs_diff_eq!(phred_score(0.001), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(phred_score(1.0), 0.0, epsilon = 1e-9);
        assert_eq!(phred_score(0.0), 255.0);
        assert_eq!(phred_score(1e-300), 255.0);
    }

    #[test]
    fn test_file_source_rewind() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "chr1\t1\nchr1\t2\r\n").unwrap();
        file.flush().unwrap();

        let mut source = FileLineSource::open(file.path()).unwrap();
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chr1\t1"));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chr1\t2"));
        assert_eq!(source.next_line().unwrap(), None);

        source.rewind().unwrap();
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chr1\t1"));
    }

    #[test]
    fn test_invalid_utf8_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"chr1\t1\tA\nchr1\t2\t\xff\xfe\nchr1\t3\tC\n").unwrap();
        file.flush().unwrap();

        let mut source = FileLineSource::open(file.path()).unwrap();
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chr1\t1\tA"));
        match source.next_line() {
            Err(VarcallError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a malformed record, got {:?}", other)
        }
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chr1\t3\tC"));
        assert_eq!(source.next_line().unwrap(), None);

        source.rewind().unwrap();
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chr1\t1\tA"));
        assert!(source.next_line().is_err());
    }

    #[test]
    fn test_gzip_source() {
        let file = tempfile::Builder::new().suffix(".pileup.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        encoder.write_all(b"chrX\t10\tA\t0\n").unwrap();
        encoder.finish().unwrap();

        let mut source = FileLineSource::open(file.path()).unwrap();
        assert_eq!(source.next_line().unwrap().as_deref(), Some("chrX\t10\tA\t0"));
        assert_eq!(source.next_line().unwrap(), None);
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemoryLineSource::new(&["a", "b"]);
        assert_eq!(source.next_line().unwrap().as_deref(), Some("a"));
        source.rewind().unwrap();
        assert_eq!(source.next_line().unwrap().as_deref(), Some("a"));
        assert_eq!(source.next_line().unwrap().as_deref(), Some("b"));
        assert_eq!(source.next_line().unwrap(), None);
    }
}
