//! Flat-file CSV store
//!
//! Writes two append-only files into one directory:
//!
//! - `vitals.csv`: `timestamp_ms,frame_index,sequence,spo2,pulse,valid`
//! - `waveform.csv`: `frame_index,channel,sample_index,value`
//!
//! Headers are written once, when a file is created. Appends run on the
//! blocking pool. A batch is rendered in memory and both files are opened
//! before either is written, so only an I/O error between the two writes can
//! leave vitals rows that are written again on retry; `frame_index`
//! identifies such repeats.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::RecordStore;
use crate::types::IndexedRecord;
use crate::{OxilinkError, PersistError, Result};

const VITALS_FILE: &str = "vitals.csv";
const WAVEFORM_FILE: &str = "waveform.csv";
const VITALS_HEADER: [&str; 6] = ["timestamp_ms", "frame_index", "sequence", "spo2", "pulse", "valid"];
const WAVEFORM_HEADER: [&str; 4] = ["frame_index", "channel", "sample_index", "value"];

#[derive(Serialize)]
struct VitalsRow {
    timestamp_ms: u64,
    frame_index: u64,
    sequence: Option<u8>,
    spo2: u8,
    pulse: u8,
    valid: bool,
}

#[derive(Serialize)]
struct WaveformRow<'a> {
    frame_index: u64,
    channel: &'a str,
    sample_index: u64,
    value: u8,
}

/// CSV files in a directory.
#[derive(Debug, Clone)]
pub struct CsvStore {
    vitals_path: PathBuf,
    waveform_path: PathBuf,
}

impl CsvStore {
    /// Open (creating if needed) the store directory and its files.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| OxilinkError::file_error(dir.to_path_buf(), e))?;

        let store = Self { vitals_path: dir.join(VITALS_FILE), waveform_path: dir.join(WAVEFORM_FILE) };
        ensure_header(&store.vitals_path, &VITALS_HEADER)?;
        ensure_header(&store.waveform_path, &WAVEFORM_HEADER)?;

        info!("CSV store ready at {}", dir.display());
        Ok(store)
    }

    pub fn vitals_path(&self) -> &Path {
        &self.vitals_path
    }

    pub fn waveform_path(&self) -> &Path {
        &self.waveform_path
    }

    fn write_batch(&self, records: &[Arc<IndexedRecord>]) -> std::result::Result<(), PersistError> {
        let mut vitals = buffer_writer();
        let mut waveform = buffer_writer();
        for record in records {
            if let Some(v) = &record.vitals {
                vitals.serialize(VitalsRow {
                    timestamp_ms: record.captured_at_ms,
                    frame_index: record.frame_index,
                    sequence: record.sequence,
                    spo2: v.spo2,
                    pulse: v.pulse,
                    valid: v.valid,
                })?;
            }
            for run in &record.channels {
                for sample in run.samples() {
                    waveform.serialize(WaveformRow {
                        frame_index: record.frame_index,
                        channel: &run.channel,
                        sample_index: sample.index,
                        value: sample.value,
                    })?;
                }
            }
        }
        let vitals = into_bytes(vitals)?;
        let waveform = into_bytes(waveform)?;

        // both files open before either is touched
        let mut vitals_file = OpenOptions::new().append(true).open(&self.vitals_path)?;
        let mut waveform_file = OpenOptions::new().append(true).open(&self.waveform_path)?;
        vitals_file.write_all(&vitals)?;
        waveform_file.write_all(&waveform)?;

        debug!(records = records.len(), "CSV batch appended");
        Ok(())
    }
}

fn buffer_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new())
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> std::result::Result<Vec<u8>, PersistError> {
    writer.into_inner().map_err(|e| PersistError::from(e.into_error()))
}

fn ensure_header(path: &Path, header: &[&str]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| OxilinkError::file_error(path.to_path_buf(), e))?;

    let empty = file
        .metadata()
        .map_err(|e| OxilinkError::file_error(path.to_path_buf(), e))?
        .len()
        == 0;

    if empty {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(header).map_err(PersistError::from)?;
        writer.flush().map_err(|e| OxilinkError::file_error(path.to_path_buf(), e))?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl RecordStore for CsvStore {
    async fn append_batch(&self, records: &[Arc<IndexedRecord>]) -> std::result::Result<(), PersistError> {
        if records.is_empty() {
            return Ok(());
        }

        let store = self.clone();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || store.write_batch(&records))
            .await
            .map_err(|e| PersistError::Io { source: std::io::Error::other(e) })?
    }
}
