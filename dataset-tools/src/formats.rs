//! Training-record serializations of a [`TrainingExample`].

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::DatasetError;
use crate::types::{AlpacaRecord, ChatMlRecord, Message, Role, SimpleRecord, TrainingExample};

/// Default system preamble
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Output serialization selected on the command line or in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Alpaca,
    ChatMl,
    Simple,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [
        OutputFormat::Alpaca,
        OutputFormat::ChatMl,
        OutputFormat::Simple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Alpaca => "alpaca",
            OutputFormat::ChatMl => "chatml",
            OutputFormat::Simple => "simple",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alpaca" => Ok(OutputFormat::Alpaca),
            "chatml" => Ok(OutputFormat::ChatMl),
            "simple" => Ok(OutputFormat::Simple),
            _ => Err(DatasetError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A formatted record, serialized without a variant tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FormattedRecord {
    Alpaca(AlpacaRecord),
    ChatMl(ChatMlRecord),
    Simple(SimpleRecord),
}

/// Render turns as a labelled transcript, one `Label: content` per line.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Converts training examples into output records.
#[derive(Debug, Clone)]
pub struct Formatter {
    system_prompt: String,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl Formatter {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// `{instruction, input, output}`; input and output carry the example
    /// context and target unchanged.
    pub fn to_alpaca(&self, example: &TrainingExample) -> AlpacaRecord {
        AlpacaRecord {
            instruction: self.system_prompt.clone(),
            input: example.context.clone(),
            output: example.target.clone(),
        }
    }

    /// `{messages}`: system preamble, the context turns, then the target reply.
    pub fn to_chatml(&self, example: &TrainingExample) -> ChatMlRecord {
        let mut messages = Vec::with_capacity(example.history.len() + 2);
        messages.push(Message::new(Role::System, self.system_prompt.as_str()));
        messages.extend(example.history.iter().cloned());
        messages.push(Message::new(Role::Assistant, example.target.as_str()));
        ChatMlRecord { messages }
    }

    /// `{prompt, completion}` with the prompt ending in an open `Assistant:` turn.
    pub fn to_simple(&self, example: &TrainingExample) -> SimpleRecord {
        SimpleRecord {
            prompt: format!(
                "{}\n{}:",
                render_transcript(&example.history),
                Role::Assistant.label()
            ),
            completion: example.target.clone(),
        }
    }

    pub fn format(&self, example: &TrainingExample, format: OutputFormat) -> FormattedRecord {
        match format {
            OutputFormat::Alpaca => FormattedRecord::Alpaca(self.to_alpaca(example)),
            OutputFormat::ChatMl => FormattedRecord::ChatMl(self.to_chatml(example)),
            OutputFormat::Simple => FormattedRecord::Simple(self.to_simple(example)),
        }
    }
}
