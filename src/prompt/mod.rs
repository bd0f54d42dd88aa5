//! Locale-aware prompt templates.
//!
//! A [`store::TemplateStore`] holds one [`TemplateCollection`] per locale and is
//! built once at startup. A [`resolver::PromptResolver`] picks the collection for
//! a request (explicit locale, detected locale, or the default) and fills in
//! `{placeholder}` parameters.

pub mod placeholder;
pub mod resolver;
pub mod store;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use resolver::{resolve_effective_locale, PromptResolver, Resolution, Substitution};
pub use store::TemplateStore;

/// A single prompt template.
///
/// The shape of a given key is the same in every locale: a key that is `Text`
/// in English is `Text` in Vietnamese too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptTemplate {
    /// Instruction text with `{name}` placeholders; `{{` and `}}` are literal braces.
    Text(String),
    /// Few-shot exemplars, always used verbatim.
    Examples(Vec<String>),
}

impl PromptTemplate {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Examples(_) => None,
        }
    }

    pub fn as_examples(&self) -> Option<&[String]> {
        match self {
            Self::Text(_) => None,
            Self::Examples(items) => Some(items),
        }
    }

    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Examples(_) => "examples",
        }
    }
}

impl From<&str> for PromptTemplate {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PromptTemplate {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for PromptTemplate {
    fn from(items: Vec<String>) -> Self {
        Self::Examples(items)
    }
}

/// Templates for one locale, keyed by role (`rag_response`, `keywords_extraction`, ...).
///
/// Immutable once built; [`TemplateStore::merge`] returns a new collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateCollection {
    templates: BTreeMap<String, PromptTemplate>,
}

impl TemplateCollection {
    pub fn new(templates: BTreeMap<String, PromptTemplate>) -> Self {
        Self { templates }
    }

    /// Parse a flat TOML table of `key = "text"` / `key = ["example", ...]`.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Load custom templates from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read templates from {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse templates in {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.templates.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PromptTemplate)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// A copy of `self` with every entry of `overrides` written over it.
    pub(crate) fn overlaid_with(&self, overrides: &TemplateCollection) -> TemplateCollection {
        let mut templates = self.templates.clone();
        templates.extend(
            overrides
                .templates
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        TemplateCollection { templates }
    }
}

impl FromIterator<(String, PromptTemplate)> for TemplateCollection {
    fn from_iter<I: IntoIterator<Item = (String, PromptTemplate)>>(iter: I) -> Self {
        Self {
            templates: iter.into_iter().collect(),
        }
    }
}
