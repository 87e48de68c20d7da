//! Gzip-compressed, line-oriented recrawl journal
//!
//! Every record is written as `"\n"` followed by the concatenated parts, so a
//! reader tolerates a torn final line. Two kinds of marker lines are mixed in:
//!
//! ```text
//! T 20240101120000            every `timestamp_interval` data lines
//! E 20240101120000 <message>  on serious errors
//! ```
//!
//! A checkpoint finishes the live file, renames it to `<name>.<checkpoint>`
//! and starts a fresh file under the original name. Writers share one mutex,
//! so a rotation never splits or duplicates a line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::metrics;
use crate::storage::checkpoint::Checkpointable;
use crate::utils::error::JournalError;

/// Marker prefix of periodic timestamp lines
pub const TIMESTAMP_PREFIX: &str = "T ";

/// Marker prefix of serious-error lines
pub const ERROR_PREFIX: &str = "E ";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

type JournalWriter = GzEncoder<BufWriter<File>>;

struct JournalState {
    out: Option<JournalWriter>,
    lines: u64,
}

/// Append-only gzip journal
pub struct CrawlerJournal {
    path: PathBuf,
    timestamp_interval: u64,
    state: Mutex<JournalState>,
}

impl CrawlerJournal {
    /// Open (truncating) the journal at `path`
    ///
    /// A `timestamp_interval` of 0 disables timestamp markers.
    pub fn create(path: impl AsRef<Path>, timestamp_interval: u64) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let out = open_writer(&path)?;

        tracing::info!(path = %path.display(), "Journal opened");
        Ok(Self {
            path,
            timestamp_interval,
            state: Mutex::new(JournalState {
                out: Some(out),
                lines: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data lines written since the journal was created
    pub fn line_count(&self) -> u64 {
        self.lock().lines
    }

    /// Append one data line made of `parts`
    ///
    /// Write failures are logged and the line is dropped.
    pub fn write_line(&self, parts: &[&str]) {
        let mut state = self.lock();
        let JournalState { out, lines } = &mut *state;
        let Some(out) = out.as_mut() else {
            tracing::warn!(path = %self.path.display(), "Write to closed journal dropped");
            return;
        };

        let result = write_record(out, parts).and_then(|()| {
            *lines += 1;
            if self.timestamp_interval > 0 && *lines % self.timestamp_interval == 0 {
                write_record(out, &[TIMESTAMP_PREFIX, &timestamp()])
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => metrics::record_journal_line(),
            Err(e) => {
                metrics::record_journal_write_error();
                tracing::error!(path = %self.path.display(), error = %e, "Journal write failed");
            }
        }
    }

    /// Append an `E <timestamp> <message>` marker line
    pub fn serious_error(&self, message: &str) {
        let mut state = self.lock();
        let Some(out) = state.out.as_mut() else {
            return;
        };
        let stamp = timestamp();
        if let Err(e) = write_record(out, &[ERROR_PREFIX, &stamp, " ", message]) {
            metrics::record_journal_write_error();
            tracing::error!(path = %self.path.display(), error = %e, "Journal error marker lost");
        }
    }

    /// Rotate the live file to `<name>.<checkpoint_dir name>`, then reopen
    ///
    /// If the rotation fails part way, the journal keeps writing: a new gzip
    /// member is appended to the file under the original name.
    pub fn rotate_for_checkpoint(&self, checkpoint_dir: &Path) -> Result<PathBuf, JournalError> {
        let suffix = checkpoint_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                JournalError::InvalidSource(format!(
                    "checkpoint directory '{}' has no name",
                    checkpoint_dir.display()
                ))
            })?;

        let mut state = self.lock();
        let was_open = state.out.is_some();
        let result = self.rotate_locked(&mut state, suffix);

        if let Err(e) = &result {
            tracing::error!(path = %self.path.display(), error = %e, "Journal rotation failed");
            if was_open && state.out.is_none() {
                match open_appending(&self.path) {
                    Ok(out) => {
                        state.out = Some(out);
                        tracing::warn!(path = %self.path.display(), "Journal reopened for append");
                    }
                    Err(e) => {
                        tracing::error!(path = %self.path.display(), error = %e, "Journal reopen failed")
                    }
                }
            }
        }
        result
    }

    fn rotate_locked(&self, state: &mut JournalState, suffix: &str) -> Result<PathBuf, JournalError> {
        if let Some(out) = state.out.take() {
            finish(out)?;
        }

        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".");
        rotated.push(suffix);
        let rotated = PathBuf::from(rotated);
        fs::rename(&self.path, &rotated)?;

        state.out = Some(open_writer(&self.path)?);
        tracing::info!(
            path = %self.path.display(),
            rotated = %rotated.display(),
            lines = state.lines,
            "Journal rotated for checkpoint"
        );
        Ok(rotated)
    }

    /// Finish the gzip stream and release the file; idempotent
    pub fn close(&self) {
        let mut state = self.lock();
        if let Some(out) = state.out.take() {
            if let Err(e) = finish(out) {
                tracing::error!(path = %self.path.display(), error = %e, "Journal close failed");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().out.is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Checkpointable for CrawlerJournal {
    fn checkpoint_name(&self) -> String {
        format!("journal:{}", self.path.display())
    }

    fn checkpoint(&self, checkpoint_dir: &Path) -> crate::Result<()> {
        self.rotate_for_checkpoint(checkpoint_dir)?;
        Ok(())
    }
}

impl Drop for CrawlerJournal {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_writer(path: &Path) -> io::Result<JournalWriter> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(GzEncoder::new(BufWriter::new(file), Compression::default()))
}

// each open appends a new gzip member; readers decode members back to back
fn open_appending(path: &Path) -> io::Result<JournalWriter> {
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    Ok(GzEncoder::new(BufWriter::new(file), Compression::default()))
}

fn write_record(out: &mut JournalWriter, parts: &[&str]) -> io::Result<()> {
    out.write_all(b"\n")?;
    for part in parts {
        out.write_all(part.as_bytes())?;
    }
    Ok(())
}

fn finish(out: JournalWriter) -> io::Result<()> {
    let mut inner = out.finish()?;
    inner.flush()
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

// ============================================================================
// Readers
// ============================================================================

/// Boxed line reader over a (possibly gzipped) journal
pub type JournalLines = Box<dyn BufRead + Send>;

/// Open a journal file, decompressing when the name ends in `.gz` or the
/// content starts with the gzip magic bytes
pub fn open_reader(path: impl AsRef<Path>) -> Result<JournalLines, JournalError> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let gzipped = path.extension().is_some_and(|ext| ext == "gz")
        || reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    tracing::debug!(path = %path.display(), gzipped, "Opening journal reader");
    Ok(wrap(reader, gzipped))
}

/// Open a journal served over HTTP(S)
///
/// The body is decompressed when the response declares content type
/// `application/x-gzip` or content encoding `gzip`.
pub fn open_url_reader(url: &str) -> Result<JournalLines, JournalError> {
    let client = reqwest::blocking::Client::builder().no_gzip().build()?;
    let response = client.get(url).send()?.error_for_status()?;

    let header_is = |name: reqwest::header::HeaderName, expected: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
    };
    let gzipped = header_is(reqwest::header::CONTENT_TYPE, "application/x-gzip")
        || header_is(reqwest::header::CONTENT_ENCODING, "gzip");

    tracing::debug!(url, gzipped, "Opening journal reader");
    Ok(wrap(BufReader::new(response), gzipped))
}

/// Open a journal given either a path or an `http(s)://` URL
pub fn open_source(source: &str) -> Result<JournalLines, JournalError> {
    if is_url(source) {
        open_url_reader(source)
    } else {
        open_reader(source)
    }
}

pub(crate) fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn wrap<R: Read + Send + 'static>(reader: BufReader<R>, gzipped: bool) -> JournalLines {
    if gzipped {
        Box::new(BufReader::new(MultiGzDecoder::new(reader)))
    } else {
        Box::new(reader)
    }
}

/// One classified journal line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Data(String),
    Timestamp(String),
    Error { timestamp: String, message: String },
}

/// Iterator over the entries of a journal, skipping blank separator lines
pub struct JournalReader<R> {
    lines: io::Lines<R>,
}

impl<R: BufRead> JournalReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for JournalReader<R> {
    type Item = Result<JournalEntry, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.is_empty() {
                continue;
            }
            return Some(Ok(classify(line)));
        }
    }
}

fn classify(line: String) -> JournalEntry {
    if let Some(stamp) = line.strip_prefix(TIMESTAMP_PREFIX) {
        JournalEntry::Timestamp(stamp.to_string())
    } else if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        let (timestamp, message) = rest.split_once(' ').unwrap_or((rest, ""));
        JournalEntry::Error {
            timestamp: timestamp.to_string(),
            message: message.to_string(),
        }
    } else {
        JournalEntry::Data(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(path: &Path) -> Vec<JournalEntry> {
        JournalReader::new(open_reader(path).unwrap())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn data(path: &Path) -> Vec<String> {
        entries(path)
            .into_iter()
            .filter_map(|e| match e {
                JournalEntry::Data(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.log.gz");
        let journal = CrawlerJournal::create(&path, 0).unwrap();
        journal.write_line(&["one"]);
        journal.write_line(&["two", " ", "parts"]);
        journal.close();

        assert_eq!(data(&path), vec!["one", "two parts"]);
        assert_eq!(journal.line_count(), 2);
    }

    #[test]
    fn test_timestamp_markers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.log.gz");
        let journal = CrawlerJournal::create(&path, 2).unwrap();
        for i in 0..5 {
            journal.write_line(&[&i.to_string()]);
        }
        journal.close();

        let all = entries(&path);
        let stamps = all
            .iter()
            .filter(|e| matches!(e, JournalEntry::Timestamp(_)))
            .count();
        assert_eq!(stamps, 2);
        assert!(matches!(&all[2], JournalEntry::Timestamp(ts) if ts.len() == 14));
    }

    #[test]
    fn test_serious_error_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.log.gz");
        let journal = CrawlerJournal::create(&path, 0).unwrap();
        journal.serious_error("disk on fire");
        journal.close();

        match &entries(&path)[0] {
            JournalEntry::Error { message, timestamp } => {
                assert_eq!(message, "disk on fire");
                assert_eq!(timestamp.len(), 14);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_checkpoint_rotates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.log.gz");
        let journal = CrawlerJournal::create(&path, 0).unwrap();
        journal.write_line(&["before"]);

        let rotated = journal
            .rotate_for_checkpoint(&dir.path().join("cp00001"))
            .unwrap();
        journal.write_line(&["after"]);
        journal.close();

        assert_eq!(rotated, dir.path().join("persist.log.gz.cp00001"));
        assert_eq!(data(&rotated), vec!["before"]);
        assert_eq!(data(&path), vec!["after"]);
    }

    #[test]
    fn test_failed_checkpoint_keeps_journal_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.gz");
        let journal = CrawlerJournal::create(&path, 0).unwrap();
        journal.write_line(&["before"]);

        // a non-empty directory where the rotated file should go
        let blocker = dir.path().join("j.gz.cp1");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("occupied"), "x").unwrap();

        assert!(journal.rotate_for_checkpoint(&dir.path().join("cp1")).is_err());
        assert!(!journal.is_closed());
        journal.write_line(&["after"]);
        journal.close();

        assert_eq!(data(&path), vec!["before", "after"]);
        assert_eq!(journal.line_count(), 2);
    }

    #[test]
    fn test_close_is_idempotent_and_drops_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.log.gz");
        let journal = CrawlerJournal::create(&path, 0).unwrap();
        journal.close();
        journal.close();
        journal.write_line(&["late"]);
        assert!(journal.is_closed());
        assert!(data(&path).is_empty());
    }

    #[test]
    fn test_plain_text_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.log");
        fs::write(&path, "\nalpha\n\nT 20240101000000\nbeta").unwrap();
        assert_eq!(data(&path), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_gzip_sniffed_without_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.log");
        let journal = CrawlerJournal::create(&path, 0).unwrap();
        journal.write_line(&["sniffed"]);
        journal.close();
        assert_eq!(data(&path), vec!["sniffed"]);
    }
}
