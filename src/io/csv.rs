/*!
# Chain Files

A chain file is a CSV table with the header `sampno,<parameter names>,lnlike`
followed by one row per recorded iteration. `sampno` is the 1-based iteration
number and strictly increases down the file. Every parameter, fixed or free,
gets a column in parameter-space order.

[`ChainWriter`] buffers rows and appends them in blocks. A block reaches the
file completely or not at all: if an append fails, the file is cut back to its
last committed length before the error is returned.

```rust
use adaptive_mcmc::io::csv::{read_chain, ChainSample, ChainWriter};

let dir = tempfile::tempdir()?;
let path = dir.path().join("chain.csv");
let names = vec!["alpha".to_string(), "beta".to_string()];

let mut writer = ChainWriter::create(&path, &names, 2)?;
writer.push(ChainSample { sampno: 1, values: vec![0.5, 1.0], log_posterior: -1.5 })?;
writer.push(ChainSample { sampno: 2, values: vec![0.6, 1.1], log_posterior: -1.2 })?;
writer.finish()?;

let table = read_chain(&path)?;
assert_eq!(table.names, names);
assert_eq!(table.samples.len(), 2);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use csv::{Reader, Writer};
use log::warn;
use ndarray::Array2;

use crate::error::{McmcError, Result};

pub const SAMPNO_COLUMN: &str = "sampno";
pub const LOG_POSTERIOR_COLUMN: &str = "lnlike";

/// One recorded row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSample {
    pub sampno: u64,
    pub values: Vec<f64>,
    pub log_posterior: f64,
}

/// Appends recorded samples to a chain file in blocks of `save_block` rows.
#[derive(Debug)]
pub struct ChainWriter {
    path: PathBuf,
    file: File,
    n_values: usize,
    save_block: usize,
    buffer: Vec<ChainSample>,
    /// Length of the file up to the last complete block.
    committed: u64,
    rows_written: u64,
}

impl ChainWriter {
    /// Creates (or truncates) the file at `path` and writes the header.
    pub fn create(path: impl AsRef<Path>, names: &[String], save_block: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| McmcError::io(&path, e))?;

        let mut header = Vec::with_capacity(names.len() + 2);
        header.push(SAMPNO_COLUMN);
        header.extend(names.iter().map(String::as_str));
        header.push(LOG_POSTERIOR_COLUMN);

        let mut writer = Self {
            path,
            file,
            n_values: names.len(),
            save_block: save_block.max(1),
            buffer: Vec::with_capacity(save_block.max(1)),
            committed: 0,
            rows_written: 0,
        };
        let bytes = writer.encode(std::iter::once(header))?;
        writer.append(&bytes)?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows that have reached the file.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Rows waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffers `sample`, flushing once a full block has accumulated.
    pub fn push(&mut self, sample: ChainSample) -> Result<()> {
        if sample.values.len() != self.n_values {
            return Err(McmcError::Format {
                path: self.path.clone(),
                reason: format!(
                    "row {} has {} values, the header names {}",
                    sample.sampno,
                    sample.values.len(),
                    self.n_values
                ),
            });
        }
        self.buffer.push(sample);
        if self.buffer.len() >= self.save_block {
            self.flush()?;
        }
        Ok(())
    }

    /// Appends every buffered row as one block.
    ///
    /// On failure the file keeps its previous contents and the rows stay
    /// buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let rows: Vec<Vec<String>> = self
            .buffer
            .iter()
            .map(|s| {
                let mut row = Vec::with_capacity(s.values.len() + 2);
                row.push(s.sampno.to_string());
                row.extend(s.values.iter().map(|v| v.to_string()));
                row.push(s.log_posterior.to_string());
                row
            })
            .collect();
        let bytes = self.encode(rows.iter())?;
        self.append(&bytes)?;
        self.rows_written += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Flushes what is left and returns the file's path.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.flush()?;
        Ok(self.path)
    }

    fn encode<I, R, F>(&self, records: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut wtr = Writer::from_writer(Vec::new());
        for record in records {
            wtr.write_record(record)
                .map_err(|e| McmcError::csv(&self.path, e))?;
        }
        wtr.into_inner()
            .map_err(|e| McmcError::io(&self.path, e.into_error()))
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let written = self
            .file
            .write_all(bytes)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            // Drop whatever part of the block made it to disk.
            let rollback = self
                .file
                .set_len(self.committed)
                .and_then(|_| self.file.seek(SeekFrom::Start(self.committed)));
            if let Err(rollback) = rollback {
                warn!(
                    "could not cut {} back to {} bytes after a failed append: {rollback}",
                    self.path.display(),
                    self.committed
                );
            }
            return Err(McmcError::io(&self.path, e));
        }
        self.committed += bytes.len() as u64;
        Ok(())
    }
}

/// A chain file read back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTable {
    /// Parameter column names, without `sampno` and `lnlike`.
    pub names: Vec<String>,
    pub samples: Vec<ChainSample>,
}

impl ChainTable {
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let k = self.names.iter().position(|n| n == name)?;
        Some(self.samples.iter().map(|s| s.values[k]).collect())
    }

    /// Parameter values as a `rows × parameters` matrix.
    pub fn values(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.samples.len(), self.names.len()), |(i, j)| {
            self.samples[i].values[j]
        })
    }
}

/// Reads a chain file, checking the header layout and that `sampno`
/// strictly increases.
pub fn read_chain(path: impl AsRef<Path>) -> Result<ChainTable> {
    let path = path.as_ref();
    let format_err = |reason: String| McmcError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let mut rdr = Reader::from_path(path).map_err(|e| McmcError::csv(path, e))?;
    let header = rdr.headers().map_err(|e| McmcError::csv(path, e))?.clone();
    let n = header.len();
    if n < 3 || &header[0] != SAMPNO_COLUMN || &header[n - 1] != LOG_POSTERIOR_COLUMN {
        return Err(format_err(format!(
            "expected `{SAMPNO_COLUMN},<names>,{LOG_POSTERIOR_COLUMN}`, found `{}`",
            header.iter().collect::<Vec<_>>().join(",")
        )));
    }
    let names: Vec<String> = header.iter().skip(1).take(n - 2).map(String::from).collect();

    let mut samples = Vec::new();
    let mut last: Option<u64> = None;
    for record in rdr.records() {
        let record = record.map_err(|e| McmcError::csv(path, e))?;
        let sampno: u64 = record[0]
            .parse()
            .map_err(|_| format_err(format!("bad sampno `{}`", &record[0])))?;
        if last.is_some_and(|prev| sampno <= prev) {
            return Err(format_err(format!(
                "sampno {sampno} does not increase after {}",
                last.unwrap_or_default()
            )));
        }
        last = Some(sampno);

        let parse = |field: &str| {
            field
                .parse::<f64>()
                .map_err(|_| format_err(format!("bad number `{field}` in row {sampno}")))
        };
        let values = (1..n - 1)
            .map(|k| parse(&record[k]))
            .collect::<Result<Vec<_>>>()?;
        let log_posterior = parse(&record[n - 1])?;
        samples.push(ChainSample {
            sampno,
            values,
            log_posterior,
        });
    }

    Ok(ChainTable { names, samples })
}
