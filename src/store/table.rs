//! CSV artifact operations. Not thread-safe on their own; `ResultStore`
//! serializes every call onto one thread.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::debug;

use crate::error::StoreError;
use crate::models::{ExtractionRecord, EXTRACTED_TIME_COLUMN, IMAGE_PATH_COLUMN};

pub struct ResultTable {
    path: PathBuf,
    columns: Option<Vec<String>>,
}

impl ResultTable {
    pub fn new(path: PathBuf, columns: Option<Vec<String>>) -> Self {
        Self { path, columns }
    }

    /// Writes `record` as the next data row and returns its zero-based row
    /// offset. Creates the file with a header row first when needed.
    pub fn append(&mut self, record: &ExtractionRecord) -> Result<usize, StoreError> {
        let existing = self.read_existing()?;

        let (mut contents, header, offset) = match existing {
            Some(bytes) => {
                let (header, rows) = inspect(&self.path, &bytes)?;
                (bytes, header, rows)
            }
            None => {
                let header = self.header_for(record);
                let contents = encode_row(&self.path, &header)?;
                (contents, header, 0)
            }
        };

        let known: HashSet<&str> = header.iter().map(String::as_str).collect();
        let dropped: Vec<String> = record
            .columns()
            .into_iter()
            .filter(|column| !known.contains(column.as_str()))
            .collect();
        if !dropped.is_empty() {
            debug!(
                "{}: fields outside the header dropped: {}",
                record.image_path,
                dropped.join(", ")
            );
        }

        let row: Vec<String> = header
            .iter()
            .map(|column| record.cell(column).unwrap_or_default())
            .collect();

        if contents.last().is_some_and(|&b| b != b'\n') {
            contents.push(b'\n');
        }
        contents.extend(encode_row(&self.path, &row)?);

        replace_atomically(&self.path, &contents)?;
        Ok(offset)
    }

    /// Number of data rows, excluding the header.
    pub fn row_count(&self) -> Result<usize, StoreError> {
        match self.read_existing()? {
            Some(bytes) => inspect(&self.path, &bytes).map(|(_, rows)| rows),
            None => Ok(0),
        }
    }

    fn header_for(&self, record: &ExtractionRecord) -> Vec<String> {
        let mut header = match &self.columns {
            Some(columns) => columns.clone(),
            None => return record.columns(),
        };
        for meta in [IMAGE_PATH_COLUMN, EXTRACTED_TIME_COLUMN] {
            if !header.iter().any(|c| c == meta) {
                header.push(meta.to_string());
            }
        }
        header
    }

    /// `None` when the artifact is absent or empty.
    fn read_existing(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(&self.path, err)),
        }
    }
}

/// Header columns and data-row count of an existing artifact.
fn inspect(path: &Path, bytes: &[u8]) -> Result<(Vec<String>, usize), StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|err| StoreError::csv(path, err))?
        .iter()
        .map(String::from)
        .collect();
    if header.iter().all(|c| c.is_empty()) {
        return Err(StoreError::MissingHeader(path.to_path_buf()));
    }

    let mut rows = 0;
    for record in reader.records() {
        record.map_err(|err| StoreError::csv(path, err))?;
        rows += 1;
    }
    Ok((header, rows))
}

fn encode_row(path: &Path, cells: &[String]) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(cells)
        .map_err(|err| StoreError::csv(path, err))?;
    writer
        .into_inner()
        .map_err(|err| StoreError::io(path, err.into_error()))
}

/// Readers see either the old file or the new one, never a partial row.
fn replace_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let write = || -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, err)
    })
}
