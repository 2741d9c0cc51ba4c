//! Extractor: delimited source files into [`RecordSet`]s.
//!
//! Sources are semicolon-delimited, UTF-8 with an optional byte-order mark,
//! first line is the header. Every file yields its own `Result`, so a failing
//! source is never confused with a source that simply has no data rows.

use std::path::{Path, PathBuf};

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::{ExtractionError, ExtractionResult};
use crate::models::{Cell, RecordSet};
use crate::schema::{SourceEncoding, SourceFormat};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Result of parsing one source, with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// File the table was read from (`None` for in-memory input)
    pub path: Option<PathBuf>,
    /// Parsed rows
    pub table: RecordSet,
    /// Encoding used to decode the bytes
    pub encoding: String,
    /// Delimiter used
    pub delimiter: char,
}

/// Read every source in order. One result per path, failures included.
pub fn extract<P: AsRef<Path>>(paths: &[P], format: &SourceFormat) -> Vec<ExtractionResult<ParseResult>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            log_info(format!("📖 Reading {}", path.display()));
            let result = extract_file(path, format);
            match &result {
                Ok(parsed) => log_success(format!(
                    "{}: {} rows, encoding {}, columns [{}]",
                    path.display(),
                    parsed.table.len(),
                    parsed.encoding,
                    parsed.table.columns().join(", ")
                )),
                Err(e) => log_error(e.to_string()),
            }
            result
        })
        .collect()
}

/// Read and parse one source file.
pub fn extract_file(path: &Path, format: &SourceFormat) -> ExtractionResult<ParseResult> {
    let bytes = std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExtractionError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ExtractionError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let mut result = parse_bytes(&bytes, format, path)?;
    result.path = Some(path.to_path_buf());
    Ok(result)
}

/// Parse raw bytes. `origin` only labels errors.
pub fn parse_bytes(bytes: &[u8], format: &SourceFormat, origin: &Path) -> ExtractionResult<ParseResult> {
    let (content, encoding) = match format.encoding {
        SourceEncoding::Utf8 => (decode_content(bytes, "utf-8", origin)?, "utf-8".to_string()),
        SourceEncoding::Auto => {
            let encoding = detect_encoding(bytes);
            (decode_content(bytes, &encoding, origin)?, encoding)
        }
    };

    let table = parse_str(&content, format, origin)?;

    Ok(ParseResult {
        path: None,
        table,
        encoding,
        delimiter: format.delimiter,
    })
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.starts_with(UTF8_BOM) {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding label, dropping a leading BOM.
pub fn decode_content(bytes: &[u8], encoding: &str, origin: &Path) -> ExtractionResult<String> {
    let encoding_error = |message: String| ExtractionError::Encoding {
        path: origin.to_path_buf(),
        message,
    };

    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => {
            let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|e| encoding_error(e.to_string()))
        }
        label => {
            let codec = encoding_rs::Encoding::for_label(label.as_bytes())
                .ok_or_else(|| encoding_error(format!("unsupported encoding '{}'", label)))?;
            let (text, had_errors) = codec.decode_without_bom_handling(bytes);
            if had_errors {
                return Err(encoding_error(format!("invalid {} byte sequence", codec.name())));
            }
            Ok(text.trim_start_matches('\u{feff}').to_string())
        }
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse decoded text into a table.
pub fn parse_str(content: &str, format: &SourceFormat, origin: &Path) -> ExtractionResult<RecordSet> {
    let malformed = |line: u64, message: String| ExtractionError::Malformed {
        path: origin.to_path_buf(),
        line,
        message,
    };

    if content.trim().is_empty() {
        return Err(ExtractionError::EmptyFile {
            path: origin.to_path_buf(),
        });
    }

    let delimiter = u8::try_from(format.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| malformed(1, format!("delimiter '{}' is not ASCII", format.delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(1, format!("cannot read header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = RecordSet::new(headers);
    let width = table.columns().len();

    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map_or(0, |p| p.line());
            malformed(line, e.to_string())
        })?;

        let line = record.position().map_or(0, |p| p.line());
        if record.len() > width {
            return Err(malformed(
                line,
                format!("found {} fields, header has {}", record.len(), width),
            ));
        }

        let row: Vec<Cell> = record
            .iter()
            .map(|value| {
                if format.is_na(value) {
                    None
                } else {
                    Some(value.to_string())
                }
            })
            .collect();
        table.push_row(row);
    }

    Ok(table)
}
