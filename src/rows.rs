// src/rows.rs
use csv::{Reader, ReaderBuilder, StringRecord, StringRecordsIntoIter};
use std::{collections::HashMap, io::Read};

/// One CSV data row, keyed by header name
pub type CsvRow = HashMap<String, String>;

/// Lazy, header-driven row stream over a CSV source.
///
/// Column order does not matter and short rows simply lack the missing
/// columns. Blank lines are skipped. The stream is finite and cannot be
/// restarted without reopening the source.
pub struct CsvRows<R: Read> {
    headers: StringRecord,
    records: StringRecordsIntoIter<R>,
}

impl<R: Read> CsvRows<R> {
    pub fn new(source: R) -> Result<Self, csv::Error> {
        let mut reader: Reader<R> = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim())
            .collect::<StringRecord>();

        Ok(Self {
            headers,
            records: reader.into_records(),
        })
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<CsvRow, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        let row = self
            .headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        Some(Ok(row))
    }
}

/// Value of a column, treating absent and empty the same way
pub fn field<'a>(row: &'a CsvRow, name: &str) -> Option<&'a str> {
    row.get(name).map(String::as_str).filter(|v| !v.is_empty())
}
