use crate::model::EvaluationRecord;
use anyhow::Context;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Append-only CSV of evaluation records. Every record is flushed and synced
/// before `append` returns, so the file on disk is always a valid prefix of
/// the run.
pub struct ResultsSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    written: usize,
}

/// What was already on disk when a run was resumed.
#[derive(Debug, Default)]
pub struct ResumeState {
    pub records: Vec<EvaluationRecord>,
    pub truncated_bytes: u64,
}

impl ResumeState {
    pub fn completed(&self) -> HashSet<(String, String)> {
        self.records.iter().map(|r| r.resume_key()).collect()
    }
}

impl ResultsSink {
    /// Starts a fresh results file, replacing any existing one.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: csv::WriterBuilder::new().has_headers(true).from_writer(file),
            written: 0,
        })
    }

    /// Reopens an existing results file for appending. A torn trailing row
    /// left by a crash is cut off; everything before it is returned.
    pub fn open_resume(path: &Path) -> anyhow::Result<(Self, ResumeState)> {
        if !path.exists() {
            return Ok((Self::create(path)?, ResumeState::default()));
        }
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read results file {}", path.display()))?;
        let (valid_end, records) = scan_valid_prefix(&bytes);

        let truncated = bytes.len() as u64 - valid_end;
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open results file {}", path.display()))?;
        if truncated > 0 {
            tracing::warn!(
                event = "nl2sql.results.truncated",
                path = %path.display(),
                bytes = truncated,
                "dropping incomplete trailing row"
            );
            file.set_len(valid_end)?;
            file.sync_data()?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(path)?;
        let has_header = valid_end > 0;
        let sink = Self {
            path: path.to_path_buf(),
            writer: csv::WriterBuilder::new()
                .has_headers(!has_header)
                .from_writer(file),
            written: records.len(),
        };
        Ok((
            sink,
            ResumeState {
                records,
                truncated_bytes: truncated,
            },
        ))
    }

    pub fn append(&mut self, rec: &EvaluationRecord) -> anyhow::Result<()> {
        self.writer
            .serialize(rec)
            .with_context(|| format!("failed to write record to {}", self.path.display()))?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// Returns the byte length of the longest prefix made of a complete header
/// and complete records, together with those records.
fn scan_valid_prefix(bytes: &[u8]) -> (u64, Vec<EvaluationRecord>) {
    // A record is only complete once its terminator reached the disk.
    let Some(last_nl) = bytes.iter().rposition(|b| *b == b'\n') else {
        return (0, Vec::new());
    };
    let candidate = &bytes[..=last_nl];

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(candidate);
    let headers = match rdr.headers() {
        Ok(h) => h.clone(),
        Err(_) => return (0, Vec::new()),
    };
    let mut valid_end = rdr.position().byte();
    let mut records = Vec::new();
    let mut raw = csv::StringRecord::new();
    loop {
        match rdr.read_record(&mut raw) {
            Ok(true) => {}
            Ok(false) | Err(_) => break,
        }
        match raw.deserialize::<EvaluationRecord>(Some(&headers)) {
            Ok(rec) => {
                records.push(rec);
                valid_end = rdr.position().byte();
            }
            Err(_) => break,
        }
    }
    (valid_end, records)
}

/// Reads every record of a results file. Unlike resume, a malformed row is an error.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<EvaluationRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open results file {}", path.display()))?;
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<EvaluationRecord>().enumerate() {
        out.push(rec.with_context(|| format!("{}: bad record #{}", path.display(), i + 1))?);
    }
    Ok(out)
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
