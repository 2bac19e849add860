//! Preprocessing configuration.
//!
//! Values come from an optional YAML file and are then overridden by
//! command-line flags. Everything is read once per invocation.

use serde::Deserialize;
use std::path::Path;

use crate::error::{DatasetError, Result};
use crate::formats::{OutputFormat, DEFAULT_SYSTEM_PROMPT};
use crate::preprocessor::SplitRatios;

/// Number of examples printed as a preview by default
const DEFAULT_PREVIEW: usize = 3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Output formats, one set of split files per format.
    pub formats: Vec<String>,
    /// Render every prior turn into the context instead of only the prompt.
    pub include_context: bool,
    pub system_prompt: String,
    /// Drop examples whose (context, target) pair was already seen.
    pub dedup: bool,
    /// How many examples to print before writing; 0 disables.
    pub preview: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            val_ratio: 0.1,
            test_ratio: 0.1,
            formats: OutputFormat::ALL
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
            include_context: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            dedup: false,
            preview: DEFAULT_PREVIEW,
        }
    }
}

impl PreprocessConfig {
    /// Load a YAML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
        Self::from_yaml(&content)
            .map_err(|e| DatasetError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn ratios(&self) -> SplitRatios {
        SplitRatios {
            train: self.train_ratio,
            validation: self.val_ratio,
            test: self.test_ratio,
        }
    }

    /// Parse the configured format names, rejecting unknown ones and
    /// dropping repeats.
    pub fn output_formats(&self) -> Result<Vec<OutputFormat>> {
        if self.formats.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "at least one output format is required".into(),
            ));
        }

        let mut formats = Vec::with_capacity(self.formats.len());
        for name in &self.formats {
            let format: OutputFormat = name.parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        Ok(formats)
    }
}
