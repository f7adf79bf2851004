//! Locating and streaming the formulary table from a PUF archive or flat CSV.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder};
use zip::ZipArchive;
use zip::result::ZipResult;

use crate::error::{IngestError, Result};

/// One source row keyed by trimmed column name.
pub type RawRow = HashMap<String, String>;

enum Source {
    Archive {
        archive: ZipArchive<BufReader<File>>,
        index: usize,
    },
    Flat,
}

/// A formulary table that has been located but not yet read.
pub struct FormularyTable {
    path: PathBuf,
    name: String,
    source: Source,
}

impl FormularyTable {
    /// Opens `path`, picking the formulary entry when it is a `.zip` archive.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngestError::InputNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                IngestError::io(path, e)
            }
        })?;

        if !is_archive(path) {
            return Ok(Self {
                path: path.to_path_buf(),
                name: path.display().to_string(),
                source: Source::Flat,
            });
        }

        let archive_err = |source| IngestError::Archive {
            path: path.to_path_buf(),
            source,
        };
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_err)?;
        let (index, name) = find_formulary_entry(&mut archive)
            .map_err(archive_err)?
            .ok_or_else(|| IngestError::NoTableFound {
                path: path.to_path_buf(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            name,
            source: Source::Archive { archive, index },
        })
    }

    /// Archive entry name, or the file path for flat input.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a single forward pass over the table rows.
    pub fn rows(&mut self) -> Result<RawRows<'_>> {
        let reader: Box<dyn Read + '_> = match &mut self.source {
            Source::Archive { archive, index } => {
                let entry = archive
                    .by_index(*index)
                    .map_err(|source| IngestError::Archive {
                        path: self.path.clone(),
                        source,
                    })?;
                Box::new(entry)
            }
            Source::Flat => {
                let file = File::open(&self.path).map_err(|e| IngestError::io(&self.path, e))?;
                Box::new(BufReader::new(file))
            }
        };
        RawRows::new(reader, &self.path)
    }
}

/// Lazy iterator of trimmed rows. Cells are decoded as UTF-8 with invalid
/// bytes replaced.
pub struct RawRows<'a> {
    reader: csv::Reader<Box<dyn Read + 'a>>,
    headers: Vec<String>,
    record: ByteRecord,
    path: &'a Path,
}

impl<'a> RawRows<'a> {
    fn new(reader: Box<dyn Read + 'a>, path: &'a Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader
            .byte_headers()
            .map_err(|e| IngestError::csv(path, e))?
            .iter()
            .map(|h| {
                String::from_utf8_lossy(h)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .to_string()
            })
            .collect();
        Ok(Self {
            reader,
            headers,
            record: ByteRecord::new(),
            path,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for RawRows<'_> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(true) => Some(Ok(self
                .headers
                .iter()
                .zip(self.record.iter())
                .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).trim().to_string()))
                .collect())),
            Ok(false) => None,
            Err(e) => Some(Err(IngestError::csv(self.path, e))),
        }
    }
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|x| x.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Entry names vary by release year; anything like `*formulary*.csv` counts.
pub fn is_formulary_table(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("formulary") && lower.ends_with(".csv")
}

fn find_formulary_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> ZipResult<Option<(usize, String)>> {
    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();
        if is_formulary_table(&name) {
            return Ok(Some((i, name)));
        }
    }
    Ok(None)
}
