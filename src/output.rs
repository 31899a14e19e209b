use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use log::{debug, info};

use crate::error::OutputError;
use crate::property::{PropertyRecord, OUTPUT_HEADER};

/// How records reach the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write and flush every record as soon as it is produced.
    Streaming,
    /// Buffer records and write them `batch_size` at a time.
    Batched { batch_size: usize },
}

/// CSV sink with the fixed property header.
pub struct OutputWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    mode: WriteMode,
    buffer: Vec<PropertyRecord>,
    written: usize,
}

impl OutputWriter {
    /// Truncates (or, with `append`, extends) `path` and writes the header when the file is new.
    pub fn open(path: &Path, mode: WriteMode, append: bool) -> Result<Self, OutputError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let has_content = append && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            OpenOptions::new().create(true).write(true).truncate(true).open(path)?
        };

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if !has_content {
            writer.write_record(OUTPUT_HEADER)?;
            writer.flush()?;
        }
        info!(
            "Writing results to {:?} ({})",
            path,
            if has_content { "appending" } else { "new file" }
        );

        Ok(OutputWriter {
            writer,
            path: path.to_path_buf(),
            mode,
            buffer: Vec::new(),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn write(&mut self, record: PropertyRecord) -> Result<(), OutputError> {
        match self.mode {
            WriteMode::Streaming => {
                self.writer.serialize(&record)?;
                self.writer.flush()?;
                self.written += 1;
            }
            WriteMode::Batched { batch_size } => {
                self.buffer.push(record);
                if self.buffer.len() >= batch_size {
                    self.flush_batch()?;
                }
            }
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<(), OutputError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        for record in self.buffer.drain(..) {
            self.writer.serialize(&record)?;
            self.written += 1;
        }
        self.writer.flush()?;
        debug!("Flushed batch, {} records written so far", self.written);
        Ok(())
    }

    /// Writes any buffered records and returns the total written.
    pub fn finish(mut self) -> Result<usize, OutputError> {
        self.flush_batch()?;
        self.writer.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Status;
    use tempfile::TempDir;

    fn record(apn: &str) -> PropertyRecord {
        let mut r = PropertyRecord::failed(apn, Status::Success);
        r.owner1 = Some("SMITH, JOHN".to_string());
        r
    }

    const HEADER: &str = "APN,Address,City,State,Zip_Code,Owner1,Owner2,Location_Address,Mailing_Address,Status\n";

    #[test]
    fn streaming_writes_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let mut writer = OutputWriter::open(&path, WriteMode::Streaming, false).unwrap();
        writer.write(record("1")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}1,,,,,\"SMITH, JOHN\",,,,Success\n", HEADER));
        assert_eq!(writer.finish().unwrap(), 1);
    }

    #[test]
    fn batched_holds_records_until_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = OutputWriter::open(&path, WriteMode::Batched { batch_size: 2 }, false).unwrap();

        writer.write(record("1")).unwrap();
        assert_eq!(writer.pending(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), HEADER);

        writer.write(record("2")).unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.path(), path.as_path());
        writer.write(record("3")).unwrap();
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.finish().unwrap(), 3);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn overwrite_replaces_previous_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale,data\n").unwrap();

        let writer = OutputWriter::open(&path, WriteMode::Streaming, false).unwrap();
        writer.finish().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), HEADER);
    }

    #[test]
    fn append_keeps_single_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut first = OutputWriter::open(&path, WriteMode::Streaming, true).unwrap();
        first.write(record("1")).unwrap();
        first.finish().unwrap();

        let mut second = OutputWriter::open(&path, WriteMode::Streaming, true).unwrap();
        second.write(record("2")).unwrap();
        second.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("APN,Address").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }
}
