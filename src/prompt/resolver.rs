//! Template selection by locale, with default-locale fallback and parameter fill.

use std::collections::HashMap;
use std::sync::Arc;

use super::placeholder::{self, FillError};
use super::{PromptTemplate, TemplateCollection, TemplateStore};
use crate::config::VietragConfig;
use crate::locale::detect::{self, DEFAULT_THRESHOLD};
use crate::locale::Locale;

/// What happened to the parameters during a resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// No parameters given, or the template is an example list.
    NotRequested,
    Applied,
    /// A placeholder had no value; the template came back unfilled.
    MissingParameter(String),
    /// The template's braces could not be parsed; it came back unfilled.
    Malformed,
}

impl Substitution {
    /// True when parameters were supplied but the template was returned unfilled.
    pub fn fell_back(&self) -> bool {
        matches!(self, Self::MissingParameter(_) | Self::Malformed)
    }
}

/// A resolved template plus how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub template: PromptTemplate,
    /// The locale the lookup started from.
    pub locale: Locale,
    /// True when the key came from the default collection instead of `locale`'s.
    pub from_default: bool,
    pub substitution: Substitution,
}

/// Picks templates from a shared [`TemplateStore`].
///
/// Optional custom overrides sit above every locale, as in [`TemplateStore::merge`].
#[derive(Debug, Clone)]
pub struct PromptResolver {
    store: Arc<TemplateStore>,
    overrides: TemplateCollection,
}

impl PromptResolver {
    pub fn new(store: Arc<TemplateStore>) -> Self {
        Self {
            store,
            overrides: TemplateCollection::default(),
        }
    }

    pub fn with_overrides(store: Arc<TemplateStore>, overrides: TemplateCollection) -> Self {
        Self { store, overrides }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Resolve `key` and fill in `params`.
    ///
    /// Returns `None` when neither the effective locale nor the default locale
    /// has the key. When a placeholder in a text template has no value in
    /// `params`, the template is returned exactly as stored: callers get either
    /// a fully filled prompt or the raw template, never a half-filled one. Use
    /// [`resolve_detailed`](Self::resolve_detailed) to tell the two apart.
    pub fn resolve(
        &self,
        key: &str,
        locale: Option<Locale>,
        sample_text: Option<&str>,
        params: &HashMap<String, String>,
    ) -> Option<PromptTemplate> {
        self.resolve_detailed(key, locale, sample_text, params)
            .map(|resolution| resolution.template)
    }

    pub fn resolve_detailed(
        &self,
        key: &str,
        locale: Option<Locale>,
        sample_text: Option<&str>,
        params: &HashMap<String, String>,
    ) -> Option<Resolution> {
        let locale = locale
            .or_else(|| sample_text.map(detect::detect))
            .unwrap_or(Locale::DEFAULT);

        let (template, from_default) = self.lookup(key, locale)?;

        let (template, substitution) = match template {
            PromptTemplate::Text(text) if !params.is_empty() => {
                match placeholder::fill(text, params) {
                    Ok(filled) => (PromptTemplate::Text(filled), Substitution::Applied),
                    Err(err) => {
                        let substitution = match err {
                            FillError::Missing(name) => Substitution::MissingParameter(name),
                            FillError::Malformed => Substitution::Malformed,
                        };
                        tracing::debug!(
                            key,
                            %locale,
                            ?substitution,
                            "template not filled, returning it unformatted"
                        );
                        (template.clone(), substitution)
                    }
                }
            }
            other => (other.clone(), Substitution::NotRequested),
        };

        Some(Resolution {
            template,
            locale,
            from_default,
            substitution,
        })
    }

    /// Overrides, then the locale's own collection, then the default collection.
    fn lookup(&self, key: &str, locale: Locale) -> Option<(&PromptTemplate, bool)> {
        if let Some(template) = self.overrides.get(key) {
            return Some((template, false));
        }
        if self.store.has_locale(locale) {
            if let Some(template) = self.store.get_collection(locale).get(key) {
                return Some((template, false));
            }
        }
        self.store
            .default_collection()
            .get(key)
            .map(|template| (template, locale != Locale::DEFAULT))
    }
}

/// The locale to use for a request.
///
/// A configured `addon_params.language` always wins and is canonicalized.
/// Otherwise `sample_text` decides (character ratio or function words), and
/// English is the fallback.
pub fn resolve_effective_locale(config: &VietragConfig, sample_text: &str) -> Locale {
    if let Some(language) = config.addon_params.language.as_deref() {
        return Locale::canonicalize(language);
    }

    if !sample_text.is_empty()
        && (detect::is_locale(sample_text, DEFAULT_THRESHOLD)
            || detect::contains_locale_keywords(sample_text))
    {
        return Locale::Vietnamese;
    }

    Locale::DEFAULT
}
