//! Offline engine backed by a phrase table.
//!
//! ```toml
//! target = "en"            # optional; other targets are refused
//!
//! [entries]
//! "おはよう" = "Good morning"
//! "ありがとう" = "Thank you"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::{TranslationEngine, TranslationRequest};
use crate::error::TranslateError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GlossaryFile {
    target: Option<String>,
    entries: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GlossaryEngine {
    target: Option<String>,
    entries: HashMap<String, String>,
}

impl GlossaryEngine {
    pub const ID: &'static str = "glossary";

    pub fn from_toml_str(contents: &str) -> Result<Self, TranslateError> {
        let file: GlossaryFile = toml::from_str(contents)?;
        Ok(Self {
            target: file.target,
            entries: file
                .entries
                .into_iter()
                .map(|(phrase, translation)| (phrase.trim().to_string(), translation))
                .collect(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, TranslateError> {
        let contents = fs::read_to_string(path).map_err(|source| TranslateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, text: &str) -> Result<String, TranslateError> {
        if let Some(whole) = self.entries.get(text.trim()) {
            return Ok(whole.clone());
        }
        let mut matched = false;
        let lines: Vec<&str> = text
            .lines()
            .map(|line| match self.entries.get(line.trim()) {
                Some(translation) => {
                    matched = true;
                    translation.as_str()
                }
                None => line,
            })
            .collect();
        if matched {
            Ok(lines.join("\n"))
        } else {
            Err(TranslateError::NoMatch)
        }
    }
}

#[async_trait]
impl TranslationEngine for GlossaryEngine {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, TranslateError> {
        if let Some(target) = self.target.as_deref() {
            if !target.eq_ignore_ascii_case(request.target_language) {
                return Err(TranslateError::UnsupportedLanguage {
                    language: request.target_language.to_string(),
                });
            }
        }
        self.lookup(request.text)
    }
}
