use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{DATE_FORMATS, DATETIME_FORMATS};
use crate::db::schema::{Schema, SemanticType};
use crate::error::LoadError;
use crate::normalize::is_null_marker;

/// Column names of the source file, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A source cell: raw text, or a date already parsed while reading
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Raw(String),
    Date(Option<NaiveDate>),
}

/// A single record (row) from the file, cells in file order
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    cells: Vec<Cell>,
}

impl SourceRecord {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Cell at a source position; None when the record is shorter than the header
    pub fn cell(&self, position: usize) -> Option<&Cell> {
        self.cells.get(position)
    }
}

/// Up to `capacity` consecutive records of the file
#[derive(Debug, Clone)]
pub struct SourceBatch {
    /// 1-based position of the batch in the file
    pub index: usize,
    pub header: Arc<Header>,
    pub records: Vec<SourceRecord>,
}

/// Configuration for delimited file reading (CSV, TSV, etc.)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self::csv()
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }

    /// Create from string representations
    pub fn from_strings(delimiter: &str, quote: &str) -> Result<Self> {
        let delimiter_byte = if delimiter == "\\t" {
            Self::tsv().delimiter
        } else if delimiter.len() == 1 {
            delimiter.as_bytes()[0]
        } else {
            anyhow::bail!("Delimiter must be a single character or \\t");
        };

        let quote_byte = if quote.len() == 1 {
            quote.as_bytes()[0]
        } else {
            anyhow::bail!("Quote must be a single character");
        };

        Ok(Self {
            delimiter: delimiter_byte,
            quote: quote_byte,
        })
    }
}

/// Best-effort date parse; anything unrecognized is None
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if is_null_marker(trimmed) {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
                .map(|dt| dt.date())
        })
}

/// Lazy reader yielding fixed-capacity batches in file order
///
/// Only one batch is materialized at a time. The sequence cannot be rewound;
/// open a new reader to start over.
pub struct SourceReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    header: Arc<Header>,
    date_positions: Vec<usize>,
    capacity: NonZeroUsize,
    next_index: usize,
    exhausted: bool,
}

impl SourceReader {
    pub fn open(
        path: &Path,
        config: &DelimitedConfig,
        schema: &Schema,
        capacity: NonZeroUsize,
    ) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|e| LoadError::source_io(path, e))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let names = reader
            .headers()
            .map_err(|source| LoadError::SourceParse {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let header = Header::new(names);

        // Date columns absent from the header are left for the normalizer to report
        let date_positions = schema
            .indices_of(SemanticType::Date)
            .into_iter()
            .filter_map(|idx| header.position(schema.columns()[idx].name))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header: Arc::new(header),
            date_positions,
            capacity,
            next_index: 1,
            exhausted: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_batch(&mut self) -> Result<Option<SourceBatch>, LoadError> {
        let mut records = Vec::with_capacity(self.capacity.get());
        let mut record = csv::StringRecord::new();

        while records.len() < self.capacity.get() {
            let has_record =
                self.reader
                    .read_record(&mut record)
                    .map_err(|source| LoadError::SourceParse {
                        path: self.path.clone(),
                        source,
                    })?;
            if !has_record {
                self.exhausted = true;
                break;
            }

            let cells = record
                .iter()
                .enumerate()
                .map(|(pos, field)| {
                    if self.date_positions.contains(&pos) {
                        Cell::Date(parse_date(field))
                    } else {
                        Cell::Raw(field.to_string())
                    }
                })
                .collect();
            records.push(SourceRecord::new(cells));
        }

        if records.is_empty() {
            return Ok(None);
        }

        let batch = SourceBatch {
            index: self.next_index,
            header: Arc::clone(&self.header),
            records,
        };
        self.next_index += 1;
        Ok(Some(batch))
    }
}

impl Iterator for SourceReader {
    type Item = Result<SourceBatch, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.read_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn flight_like_file(rows: usize) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "year,fl_date,origin").unwrap();
        for i in 0..rows {
            writeln!(temp_file, "2024,2024-01-{:02},ORD{}", (i % 28) + 1, i).unwrap();
        }
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_batch_boundaries() {
        let temp_file = flight_like_file(25);
        let reader = SourceReader::open(
            temp_file.path(),
            &DelimitedConfig::csv(),
            &Schema::flight_data(),
            capacity(10),
        )
        .unwrap();

        let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
        let sizes: Vec<_> = batches.iter().map(|b| b.records.len()).collect();
        let indices: Vec<_> = batches.iter().map(|b| b.index).collect();

        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let temp_file = flight_like_file(20);
        let reader = SourceReader::open(
            temp_file.path(),
            &DelimitedConfig::csv(),
            &Schema::flight_data(),
            capacity(10),
        )
        .unwrap();

        assert_eq!(reader.count(), 2);
    }

    #[test]
    fn test_header_only_file_yields_nothing() {
        let temp_file = flight_like_file(0);
        let mut reader = SourceReader::open(
            temp_file.path(),
            &DelimitedConfig::csv(),
            &Schema::flight_data(),
            capacity(10),
        )
        .unwrap();

        assert_eq!(reader.header().names(), &["year", "fl_date", "origin"]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_dates_are_parsed_while_reading() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "origin,fl_date").unwrap();
        writeln!(temp_file, "JFK,2024-02-29").unwrap();
        writeln!(temp_file, "LAX,not a date").unwrap();
        writeln!(temp_file, "SFO,").unwrap();
        writeln!(temp_file, "SEA").unwrap();
        temp_file.flush().unwrap();

        let mut reader = SourceReader::open(
            temp_file.path(),
            &DelimitedConfig::csv(),
            &Schema::flight_data(),
            capacity(100),
        )
        .unwrap();
        let batch = reader.next().unwrap().unwrap();

        assert_eq!(batch.records.len(), 4);
        assert_eq!(batch.records[0].cell(0), Some(&Cell::Raw("JFK".to_string())));
        assert_eq!(
            batch.records[0].cell(1),
            Some(&Cell::Date(NaiveDate::from_ymd_opt(2024, 2, 29)))
        );
        assert_eq!(batch.records[1].cell(1), Some(&Cell::Date(None)));
        assert_eq!(batch.records[2].cell(1), Some(&Cell::Date(None)));
        assert_eq!(batch.records[3].cell(1), None);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = SourceReader::open(
            &dir.path().join("nope.csv"),
            &DelimitedConfig::csv(),
            &Schema::flight_data(),
            capacity(10),
        );
        assert!(matches!(result, Err(LoadError::MissingSource { .. })));
    }

    #[test]
    fn test_parse_date_formats() {
        let test_cases = [
            ("2024-01-15", NaiveDate::from_ymd_opt(2024, 1, 15)),
            ("01/15/2024", NaiveDate::from_ymd_opt(2024, 1, 15)),
            ("2024/01/15", NaiveDate::from_ymd_opt(2024, 1, 15)),
            ("2024-01-15 00:00:00", NaiveDate::from_ymd_opt(2024, 1, 15)),
            ("2024-01-15T08:30:00", NaiveDate::from_ymd_opt(2024, 1, 15)),
            (" 2024-12-31 ", NaiveDate::from_ymd_opt(2024, 12, 31)),
            ("2025-02-29", None),
            ("2024-13-01", None),
            ("NaT", None),
            ("", None),
            ("N/A", None),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_date(input), expected, "input '{}'", input);
        }
    }

    #[test]
    fn test_delimiter_from_strings() {
        assert_eq!(
            DelimitedConfig::from_strings("\\t", "\"").unwrap(),
            DelimitedConfig::tsv()
        );
        assert_eq!(
            DelimitedConfig::from_strings(";", "'").unwrap().delimiter,
            b';'
        );
        assert!(DelimitedConfig::from_strings(";;", "\"").is_err());
    }
}
