//! Loader: persist the canonical table.
//!
//! Output is `;`-separated, UTF-8 with a byte-order mark, header first, no
//! index column, `\n` line endings, missing cells as empty fields. The file is
//! written next to the destination and renamed over it, so a concurrent reader
//! sees either the previous file or the complete new one.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{WriteError, WriteResult};
use crate::models::RecordSet;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What a call to [`load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The destination now holds `rows` data rows.
    Written { rows: usize },
    /// There was no table; the destination was not touched.
    Skipped,
}

/// Write `table` to `destination`, replacing any previous file.
///
/// `None` is "nothing to persist": no write, no error.
pub fn load(table: Option<&RecordSet>, destination: &Path) -> WriteResult<LoadOutcome> {
    let Some(table) = table else {
        return Ok(LoadOutcome::Skipped);
    };

    let io_error = |source: std::io::Error| WriteError::Io {
        path: destination.to_path_buf(),
        source,
    };

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_error)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
    let permissions = output_permissions(destination, tmp.as_file()).map_err(io_error)?;
    tmp.as_file().set_permissions(permissions).map_err(io_error)?;
    write_csv(table, tmp.as_file_mut()).map_err(|e| match e {
        WriteError::Io { source, .. } => io_error(source),
        WriteError::Csv { source, .. } => WriteError::Csv {
            path: destination.to_path_buf(),
            source,
        },
        other => other,
    })?;
    tmp.as_file().sync_all().map_err(io_error)?;

    tmp.persist(destination).map_err(|e| WriteError::Persist {
        path: destination.to_path_buf(),
        source: e.error,
    })?;

    Ok(LoadOutcome::Written { rows: table.len() })
}

/// Permissions of the file being replaced, or `0644` for a new file. The
/// temporary file starts owner-only and keeps its mode through the rename.
#[cfg_attr(unix, allow(unused_variables))]
fn output_permissions(destination: &Path, tmp: &fs::File) -> std::io::Result<fs::Permissions> {
    if let Ok(meta) = fs::metadata(destination) {
        if meta.is_file() {
            return Ok(meta.permissions());
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(fs::Permissions::from_mode(0o644))
    }
    #[cfg(not(unix))]
    {
        Ok(tmp.metadata()?.permissions())
    }
}

/// Serialize `table` in the canonical encoding to any writer.
pub fn write_csv<W: Write>(table: &RecordSet, mut writer: W) -> WriteResult<()> {
    let io_error = |source: std::io::Error| WriteError::Io {
        path: Path::new("<writer>").to_path_buf(),
        source,
    };
    let csv_error = |source: csv::Error| WriteError::Csv {
        path: Path::new("<writer>").to_path_buf(),
        source,
    };

    writer.write_all(UTF8_BOM).map_err(io_error)?;

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);

    csv_writer.write_record(table.columns()).map_err(csv_error)?;
    for row in table.rows() {
        csv_writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .map_err(csv_error)?;
    }
    csv_writer.flush().map_err(io_error)?;

    Ok(())
}

/// Serialize `table` into an in-memory buffer.
pub fn to_bytes(table: &RecordSet) -> WriteResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf)?;
    Ok(buf)
}
