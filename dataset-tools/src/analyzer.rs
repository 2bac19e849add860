use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{DatasetError, Result};
use crate::jsonl;
use crate::schema::{self, LineError, SchemaIssue};
use crate::types::{Conversation, DatasetStats, Role};

/// Outcome of validating a single file.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub path: PathBuf,
    /// Non-blank lines checked.
    pub records: usize,
    pub errors: Vec<LineError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Statistics and issues for one input file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub stats: DatasetStats,
    pub errors: Vec<LineError>,
}

/// Aggregate analysis over one or more files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub files: Vec<FileReport>,
    pub overall: DatasetStats,
}

impl Report {
    /// Number of line-scoped validation errors across all files.
    pub fn error_count(&self) -> usize {
        self.files.iter().map(|f| f.errors.len()).sum()
    }
}

/// A line together with its parse outcome.
struct ScannedRecord {
    number: usize,
    /// Verbatim line text; empty when the line is not valid UTF-8.
    text: String,
    parsed: std::result::Result<Conversation, Vec<SchemaIssue>>,
}

fn scan(path: &Path) -> Result<Vec<ScannedRecord>> {
    let lines = jsonl::read_lines(path)?;
    Ok(lines
        .into_iter()
        .map(|line| ScannedRecord {
            parsed: schema::parse_line(&line),
            number: line.number,
            text: line.text.unwrap_or_default(),
        })
        .collect())
}

fn line_errors(records: &[ScannedRecord]) -> Vec<LineError> {
    let mut errors = Vec::new();
    for record in records {
        if let Err(issues) = &record.parsed {
            errors.extend(issues.iter().map(|i| LineError::new(record.number, i)));
        }
    }
    errors
}

/// Check every line of a file against the conversation schema.
/// Collects all errors rather than stopping at the first.
pub fn validate(path: &Path) -> Result<ValidationResult> {
    let records = scan(path)?;
    Ok(ValidationResult {
        path: path.to_path_buf(),
        records: records.len(),
        errors: line_errors(&records),
    })
}

/// Compute statistics over one or more files (directories are expanded).
/// Malformed lines are skipped and reported, never fatal.
pub fn analyze(paths: &[PathBuf]) -> Result<Report> {
    let inputs = jsonl::collect_inputs(paths)?;
    let mut report = Report::default();

    for path in inputs {
        let file = analyze_file(&path)?;
        info!(
            file = %path.display(),
            conversations = file.stats.conversations,
            skipped = file.stats.skipped,
            "analyzed"
        );
        report.overall.merge(&file.stats);
        report.files.push(file);
    }

    Ok(report)
}

fn analyze_file(path: &Path) -> Result<FileReport> {
    let records = scan(path)?;
    let mut stats = DatasetStats::default();

    for record in &records {
        match &record.parsed {
            Ok(conversation) => stats.record(conversation),
            Err(_) => stats.skipped += 1,
        }
    }

    Ok(FileReport {
        path: path.to_path_buf(),
        errors: line_errors(&records),
        stats,
    })
}

/// Concatenate conversations from several files into `output`, in file order
/// then line order. Every input must validate cleanly; otherwise nothing is
/// written. Returns the number of conversations written.
pub fn combine(paths: &[PathBuf], output: &Path) -> Result<usize> {
    let inputs = jsonl::collect_inputs(paths)?;

    let mut lines = Vec::new();
    let mut first_failure: Option<(PathBuf, usize, String)> = None;
    let mut failures = 0;

    for path in &inputs {
        let records = scan(path)?;
        info!(file = %path.display(), records = records.len(), "loaded");

        for record in records {
            match record.parsed {
                Ok(_) => lines.push(record.text),
                Err(issues) => {
                    failures += 1;
                    if first_failure.is_none() {
                        let issue = schema::describe(&issues);
                        first_failure = Some((path.clone(), record.number, issue));
                    }
                }
            }
        }
    }

    if let Some((path, line, issue)) = first_failure {
        warn!(failures, "combine aborted, inputs contain invalid records");
        return Err(DatasetError::DataIntegrity {
            count: failures,
            path,
            line,
            issue,
        });
    }

    let written = jsonl::write_raw_lines(output, lines.iter().map(String::as_str))?;
    info!(
        output = %output.display(),
        conversations = written,
        files = inputs.len(),
        "combined"
    );
    Ok(written)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            let title = match file.path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => file.path.display().to_string(),
            };
            write_section(f, &format!("Dataset Analysis: {}", title), &file.stats)?;
            write_errors(f, &file.errors)?;
        }

        if self.files.len() > 1 {
            let title = format!("Overall ({} files)", self.files.len());
            write_section(f, &title, &self.overall)?;
            let total = self.error_count();
            if total > 0 {
                writeln!(f, "\nValidation errors: {}", total)?;
            }
        }

        if self.files.is_empty() {
            writeln!(f, "No input files.")?;
        }

        Ok(())
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, stats: &DatasetStats) -> fmt::Result {
    writeln!(f, "\n=== {} ===", title)?;
    writeln!(f, "Total conversations: {}", stats.conversations)?;
    writeln!(f, "Total messages: {}", stats.messages)?;
    for role in Role::ALL {
        writeln!(f, "  {} messages: {}", role, stats.role_count(role))?;
    }
    if stats.skipped > 0 {
        writeln!(f, "Skipped lines: {}", stats.skipped)?;
    }

    let convo = &stats.conversation_lengths;
    writeln!(f, "\nConversation length:")?;
    writeln!(f, "  Average: {:.1} messages", convo.mean())?;
    writeln!(f, "  Range: {} - {} messages", convo.min, convo.max)?;

    let content = &stats.content_lengths;
    writeln!(f, "\nMessage length:")?;
    writeln!(f, "  Average: {:.0} chars", content.mean())?;
    writeln!(f, "  Range: {} - {} chars", content.min, content.max)?;

    if !stats.categories.is_empty() {
        writeln!(f, "\nCategories:")?;
        for (category, count) in &stats.categories {
            writeln!(f, "  {}: {}", category, count)?;
        }
    }
    Ok(())
}

fn write_errors(f: &mut fmt::Formatter<'_>, errors: &[LineError]) -> fmt::Result {
    if errors.is_empty() {
        return writeln!(f, "\nAll conversations passed validation.");
    }
    writeln!(f, "\nValidation errors ({}):", errors.len())?;
    for error in errors {
        writeln!(f, "  - line {}: {}", error.line, error.message)?;
    }
    Ok(())
}

/// Render a report as human-readable text.
pub fn render_report(report: &Report) -> String {
    report.to_string()
}

/// Print a report to stdout.
pub fn print_report(report: &Report) {
    print!("{}", report);
}
