//! JSON Lines reading and writing.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::Utf8Error;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{DatasetError, Result};

/// Byte-order mark some editors put at the start of UTF-8 files
const BOM: char = '\u{feff}';

/// A non-blank input line with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedLine {
    pub number: usize,
    /// Trimmed text, or the decode error when the bytes are not UTF-8.
    pub text: std::result::Result<String, Utf8Error>,
}

/// Read every non-blank line of a JSONL file, trimmed.
///
/// A line that is not valid UTF-8 is returned with its decode error rather
/// than failing the whole file. A leading byte-order mark is dropped.
pub fn read_lines(path: &Path) -> Result<Vec<NumberedLine>> {
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for (index, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes.map_err(|e| DatasetError::io(path, e))?;
        let number = index + 1;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                lines.push(NumberedLine {
                    number,
                    text: Err(e.utf8_error()),
                });
                continue;
            }
        };

        let line = match number {
            1 => text.strip_prefix(BOM).unwrap_or(text.as_str()),
            _ => text.as_str(),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines.push(NumberedLine {
            number,
            text: Ok(trimmed.to_string()),
        });
    }

    Ok(lines)
}

/// Write one JSON object per line, creating parent directories as needed.
/// Returns the number of records written.
pub fn write_records<T, I>(path: &Path, records: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = create(path)?;
    let mut count = 0;
    for record in records {
        serde_json::to_writer(&mut writer, &record)?;
        writer
            .write_all(b"\n")
            .map_err(|e| DatasetError::io(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| DatasetError::io(path, e))?;
    Ok(count)
}

/// Write pre-serialized JSON lines verbatim.
pub fn write_raw_lines<'a, I>(path: &Path, lines: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut writer = create(path)?;
    let mut count = 0;
    for line in lines {
        writeln!(writer, "{}", line).map_err(|e| DatasetError::io(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| DatasetError::io(path, e))?;
    Ok(count)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
    Ok(BufWriter::new(file))
}

/// Expand input paths: files pass through, directories yield every
/// `*.jsonl` file beneath them in sorted order.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(DatasetError::NotFound { path: path.clone() });
        }
        if !path.is_dir() {
            inputs.push(path.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "jsonl"))
            .map(|e| e.into_path())
            .collect();
        found.sort();

        if found.is_empty() {
            tracing::warn!(dir = %path.display(), "no .jsonl files found in directory");
        }
        inputs.extend(found);
    }

    Ok(inputs)
}
