use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PreprocessConfig;
use crate::error::{DatasetError, Result};
use crate::formats::{render_transcript, Formatter, OutputFormat};
use crate::jsonl;
use crate::schema;
use crate::types::{Conversation, Role, TrainingExample};

/// Allowed deviation of the ratio sum from 1.0
const RATIO_TOLERANCE: f64 = 1e-6;

/// Characters of context/target shown per example in a preview
const PREVIEW_CHARS: usize = 200;

/// Load conversations from a JSONL file, failing on the first invalid line.
pub fn load_conversations(path: &Path) -> Result<Vec<Conversation>> {
    let lines = jsonl::read_lines(path)?;
    let mut conversations = Vec::with_capacity(lines.len());

    for line in lines {
        match schema::parse_line(&line) {
            Ok(conversation) => conversations.push(conversation),
            Err(issues) => {
                return Err(DatasetError::MalformedRecord {
                    path: path.to_path_buf(),
                    line: line.number,
                    issue: schema::describe(&issues),
                });
            }
        }
    }

    Ok(conversations)
}

/// Expand conversations into one training example per assistant reply,
/// in conversation order then turn order.
///
/// Without context the prompt is the user message right before the reply.
/// With context it is every earlier turn rendered as a labelled transcript.
pub fn prepare_training_data(
    conversations: &[Conversation],
    include_context: bool,
) -> Vec<TrainingExample> {
    let mut examples = Vec::new();

    for (conversation_id, conversation) in conversations.iter().enumerate() {
        let messages = &conversation.messages;
        let mut turn_number = 0;

        for (index, message) in messages.iter().enumerate() {
            if message.role != Role::Assistant {
                continue;
            }
            // Schema validation guarantees a user prompt right before every reply.
            let Some(prompt) = index.checked_sub(1).map(|p| &messages[p]) else {
                continue;
            };

            let (context, history) = if include_context {
                let history = messages[..index].to_vec();
                (render_transcript(&history), history)
            } else {
                (prompt.content.clone(), vec![prompt.clone()])
            };

            examples.push(TrainingExample {
                context,
                history,
                target: message.content.clone(),
                conversation_id,
                turn_number,
            });
            turn_number += 1;
        }
    }

    examples
}

/// Fractions of the example set assigned to each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            validation: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("train", self.train),
            ("validation", self.validation),
            ("test", self.test),
        ] {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(DatasetError::InvalidConfig(format!(
                    "{} ratio must be a non-negative number, got {}",
                    name, ratio
                )));
            }
        }

        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(DatasetError::InvalidConfig(format!(
                "split ratios must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// One of the three dataset partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    /// Leading part of the split's output file name.
    pub fn file_stem(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "val",
            Split::Test => "test",
        }
    }

    pub fn file_name(self, format: OutputFormat) -> String {
        format!("{}_{}.jsonl", self.file_stem(), format)
    }
}

/// Disjoint train/validation/test partition of an example sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplits<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
    pub test: Vec<T>,
}

impl<T> DatasetSplits<T> {
    pub fn iter(&self) -> impl Iterator<Item = (Split, &[T])> {
        [
            (Split::Train, self.train.as_slice()),
            (Split::Validation, self.validation.as_slice()),
            (Split::Test, self.test.as_slice()),
        ]
        .into_iter()
    }
}

/// Partition examples by position: train first, then validation, then test.
/// Validation and test sizes are `floor(ratio * N)`; train takes the rest.
/// The same input and ratios always produce the same split.
pub fn split_dataset<T: Clone>(examples: &[T], ratios: &SplitRatios) -> Result<DatasetSplits<T>> {
    ratios.validate()?;

    let total = examples.len();
    let val_len = portion(ratios.validation, total);
    let test_len = portion(ratios.test, total).min(total - val_len);
    let train_len = total - val_len - test_len;

    let (train, rest) = examples.split_at(train_len);
    let (validation, test) = rest.split_at(val_len);

    Ok(DatasetSplits {
        train: train.to_vec(),
        validation: validation.to_vec(),
        test: test.to_vec(),
    })
}

fn portion(ratio: f64, total: usize) -> usize {
    // Nudge past float error such as 0.29 * 100 = 28.999...
    let size = (ratio * total as f64 + 1e-9).floor() as usize;
    size.min(total)
}

/// Format every example and write it as one JSON line, preserving order.
/// An unknown format fails before anything is written.
pub fn save_formatted_dataset(
    examples: &[TrainingExample],
    path: &Path,
    format_name: &str,
    formatter: &Formatter,
) -> Result<usize> {
    let format: OutputFormat = format_name.parse()?;
    let records = examples.iter().map(|e| formatter.format(e, format));
    let written = jsonl::write_records(path, records)?;
    info!(path = %path.display(), examples = written, format = %format, "saved");
    Ok(written)
}

/// Drop examples whose (context, target) pair has already been seen.
pub fn deduplicate(mut examples: Vec<TrainingExample>) -> Vec<TrainingExample> {
    let mut seen = HashSet::new();
    examples.retain(|example| seen.insert(hash_example(example)));
    examples
}

/// Hash an example's context and target for deduplication.
fn hash_example(example: &TrainingExample) -> String {
    let mut hasher = Sha256::new();
    hasher.update(example.context.as_bytes());
    hasher.update([0u8]);
    hasher.update(example.target.as_bytes());
    hex::encode(hasher.finalize())
}

/// The first few examples of a run, displayed with long text truncated.
struct Preview<'a> {
    examples: &'a [TrainingExample],
}

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.examples.len();
        writeln!(f, "\n=== Preview of {} Training Examples ===", shown)?;

        for (i, example) in self.examples.iter().enumerate() {
            writeln!(f, "\n--- Example {} ---", i + 1)?;
            writeln!(f, "Context: {}", truncate(&example.context))?;
            writeln!(f, "Target: {}", truncate(&example.target))?;
            writeln!(
                f,
                "Conversation: {}, Turn: {}",
                example.conversation_id, example.turn_number
            )?;
        }
        Ok(())
    }
}

/// Render the first `count` examples with long text truncated.
pub fn render_preview(examples: &[TrainingExample], count: usize) -> String {
    let shown = count.min(examples.len());
    Preview {
        examples: &examples[..shown],
    }
    .to_string()
}

/// Print a preview of the first `count` examples to stdout.
pub fn print_preview(examples: &[TrainingExample], count: usize) {
    print!("{}", render_preview(examples, count));
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Counts and outputs of a preprocessing run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessSummary {
    pub conversations: usize,
    pub examples: usize,
    pub duplicates_removed: usize,
    pub train: usize,
    pub validation: usize,
    pub test: usize,
    pub files: Vec<PathBuf>,
}

/// Load, expand, split and write a dataset in every configured format.
/// Configuration is checked before any input is read or output written.
pub fn preprocess(
    input: &Path,
    output_dir: &Path,
    config: &PreprocessConfig,
) -> Result<PreprocessSummary> {
    let formats = config.output_formats()?;
    let ratios = config.ratios();
    ratios.validate()?;

    let conversations = load_conversations(input)?;
    info!(
        input = %input.display(),
        conversations = conversations.len(),
        "loaded conversations"
    );

    let mut examples = prepare_training_data(&conversations, config.include_context);
    info!(
        examples = examples.len(),
        include_context = config.include_context,
        "created training examples"
    );

    let mut duplicates_removed = 0;
    if config.dedup {
        let before = examples.len();
        examples = deduplicate(examples);
        duplicates_removed = before - examples.len();
        info!(before, after = examples.len(), "deduplicated");
    }

    if config.preview > 0 {
        print_preview(&examples, config.preview);
    }

    let splits = split_dataset(&examples, &ratios)?;
    info!(
        train = splits.train.len(),
        validation = splits.validation.len(),
        test = splits.test.len(),
        "split"
    );

    std::fs::create_dir_all(output_dir).map_err(|e| DatasetError::io(output_dir, e))?;

    let formatter = Formatter::new(config.system_prompt.as_str());
    let mut files = Vec::new();
    for format in formats {
        debug!(format = %format, "writing splits");
        for (split, items) in splits.iter() {
            let path = output_dir.join(split.file_name(format));
            save_formatted_dataset(items, &path, format.as_str(), &formatter)?;
            files.push(path);
        }
    }

    Ok(PreprocessSummary {
        conversations: conversations.len(),
        examples: examples.len(),
        duplicates_removed,
        train: splits.train.len(),
        validation: splits.validation.len(),
        test: splits.test.len(),
        files,
    })
}
