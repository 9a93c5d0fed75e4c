// src/codec.rs
//
// Payload codecs used at the object boundary:
//   - JSON (UTF-8, pretty-printed on write)
//   - delimited text, header-keyed ("records") or positional ("rows"), pluggable dialect
//   - opaque blobs via bincode
//
// Blob payloads are a Rust/serde encoding of the value's type. They are NOT portable
// across language runtimes and decode only into a type with the same serde shape.

use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::{Result, StoreError};

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(value)?;
    out.push(b'\n');
    Ok(out)
}

pub fn decode_json<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(raw)?)
}

pub fn encode_blob<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode_blob<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(raw)?)
}

/// When fields are quoted on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    Necessary,
    Always,
    Never,
    NonNumeric,
}

impl From<Quoting> for QuoteStyle {
    fn from(q: Quoting) -> Self {
        match q {
            Quoting::Necessary => QuoteStyle::Necessary,
            Quoting::Always => QuoteStyle::Always,
            Quoting::Never => QuoteStyle::Never,
            Quoting::NonNumeric => QuoteStyle::NonNumeric,
        }
    }
}

/// Field delimiter, quoting and line ending of a delimited-text table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub quoting: Quoting,
    pub double_quote: bool,
    pub crlf: bool,
}

impl Dialect {
    /// Comma separated, minimal quoting, CRLF line endings.
    pub fn excel() -> Self {
        Self { delimiter: b',', quote: b'"', quoting: Quoting::Necessary, double_quote: true, crlf: true }
    }

    /// Like `excel` with tab separators.
    pub fn excel_tab() -> Self {
        Self { delimiter: b'\t', ..Self::excel() }
    }

    /// Comma separated, every field quoted, LF line endings.
    pub fn unix() -> Self {
        Self { delimiter: b',', quote: b'"', quoting: Quoting::Always, double_quote: true, crlf: false }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    /// Look up a preset by name (`excel`, `excel-tab`, `unix`).
    pub fn named(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "excel" => Some(Self::excel()),
            "excel-tab" => Some(Self::excel_tab()),
            "unix" => Some(Self::unix()),
            _ => None,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::excel()
    }
}

/// How rows come back from a delimited-text read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// First line is a header; each row is keyed by it.
    #[default]
    Records,
    /// Every line, header included, as a list of fields.
    Rows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CsvOptions {
    pub dialect: Dialect,
    pub mode: TableMode,
}

impl CsvOptions {
    pub fn records(dialect: Dialect) -> Self {
        Self { dialect, mode: TableMode::Records }
    }

    pub fn rows(dialect: Dialect) -> Self {
        Self { dialect, mode: TableMode::Rows }
    }
}

/// A decoded delimited-text table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Table {
    Records { headers: Vec<String>, rows: Vec<HashMap<String, String>> },
    Rows(Vec<Vec<String>>),
}

impl Table {
    pub fn len(&self) -> usize {
        match self {
            Table::Records { rows, .. } => rows.len(),
            Table::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn decode_csv(raw: &[u8], options: CsvOptions) -> Result<Table> {
    let d = options.dialect;
    let mut rdr = ReaderBuilder::new()
        .delimiter(d.delimiter)
        .quote(d.quote)
        .double_quote(d.double_quote)
        .has_headers(options.mode == TableMode::Records)
        .flexible(options.mode == TableMode::Rows)
        .from_reader(raw);

    match options.mode {
        TableMode::Records => {
            let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
            let mut rows = Vec::new();
            for record in rdr.records() {
                let record = record?;
                rows.push(
                    headers
                        .iter()
                        .cloned()
                        .zip(record.iter().map(str::to_string))
                        .collect::<HashMap<_, _>>(),
                );
            }
            Ok(Table::Records { headers, rows })
        }
        TableMode::Rows => {
            let mut rows = Vec::new();
            for record in rdr.records() {
                rows.push(record?.iter().map(str::to_string).collect());
            }
            Ok(Table::Rows(rows))
        }
    }
}

pub fn encode_csv(table: &Table, dialect: Dialect) -> Result<Vec<u8>> {
    let mut wtr = WriterBuilder::new()
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .double_quote(dialect.double_quote)
        .quote_style(dialect.quoting.into())
        .terminator(if dialect.crlf { Terminator::CRLF } else { Terminator::Any(b'\n') })
        .flexible(matches!(table, Table::Rows(_)))
        .from_writer(Vec::new());

    match table {
        Table::Records { headers, rows } => {
            wtr.write_record(headers)?;
            for row in rows {
                wtr.write_record(headers.iter().map(|h| row.get(h).map(String::as_str).unwrap_or("")))?;
            }
        }
        Table::Rows(rows) => {
            for row in rows {
                wtr.write_record(row)?;
            }
        }
    }
    wtr.into_inner().map_err(|e| StoreError::Codec(format!("csv: {}", e.error())))
}
