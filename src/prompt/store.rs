//! Read-only registry of template collections, one per locale.

use std::collections::BTreeMap;

use thiserror::Error;

use super::TemplateCollection;
use crate::locale::Locale;

const ENGLISH_TEMPLATES: &str = include_str!("../../templates/en.toml");
const VIETNAMESE_TEMPLATES: &str = include_str!("../../templates/vi.toml");

#[derive(Debug, Error)]
pub enum TemplateStoreError {
    #[error("failed to parse {locale} templates: {source}")]
    Parse {
        locale: Locale,
        #[source]
        source: toml::de::Error,
    },

    #[error("no templates for the default locale ({})", Locale::DEFAULT)]
    MissingDefault,

    #[error("template `{key}` is {found} in {locale} but {expected} in {}", Locale::DEFAULT)]
    ShapeMismatch {
        key: String,
        locale: Locale,
        expected: &'static str,
        found: &'static str,
    },
}

/// Template collections keyed by locale. Always contains [`Locale::DEFAULT`].
///
/// Built once (usually via [`TemplateStore::builtin`]) and shared by `Arc`.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    collections: BTreeMap<Locale, TemplateCollection>,
}

impl TemplateStore {
    /// The templates bundled with the crate: English (default) and Vietnamese.
    pub fn builtin() -> Result<Self, TemplateStoreError> {
        Self::from_toml_strs([
            (Locale::English, ENGLISH_TEMPLATES),
            (Locale::Vietnamese, VIETNAMESE_TEMPLATES),
        ])
    }

    /// Parse one TOML document per locale.
    pub fn from_toml_strs<'a>(
        sources: impl IntoIterator<Item = (Locale, &'a str)>,
    ) -> Result<Self, TemplateStoreError> {
        let collections = sources
            .into_iter()
            .map(|(locale, source)| {
                TemplateCollection::from_toml_str(source)
                    .map(|collection| (locale, collection))
                    .map_err(|source| TemplateStoreError::Parse { locale, source })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Self::from_collections(collections)
    }

    /// Build from ready collections, checking that every key keeps the default
    /// locale's shape.
    pub fn from_collections(
        collections: BTreeMap<Locale, TemplateCollection>,
    ) -> Result<Self, TemplateStoreError> {
        let default = collections
            .get(&Locale::DEFAULT)
            .ok_or(TemplateStoreError::MissingDefault)?;

        for (&locale, collection) in &collections {
            if locale == Locale::DEFAULT {
                continue;
            }
            for (key, template) in collection.iter() {
                if let Some(base) = default.get(key) {
                    if base.shape() != template.shape() {
                        return Err(TemplateStoreError::ShapeMismatch {
                            key: key.to_string(),
                            locale,
                            expected: base.shape(),
                            found: template.shape(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            locales = collections.len(),
            default_keys = default.len(),
            "template store built"
        );
        Ok(Self { collections })
    }

    /// The collection for `locale`, or the default collection if it has none.
    pub fn get_collection(&self, locale: Locale) -> &TemplateCollection {
        self.collections
            .get(&locale)
            .unwrap_or_else(|| self.default_collection())
    }

    pub fn default_collection(&self) -> &TemplateCollection {
        // from_collections guarantees the default entry
        &self.collections[&Locale::DEFAULT]
    }

    /// Whether `locale` has its own collection (as opposed to borrowing the default).
    pub fn has_locale(&self, locale: Locale) -> bool {
        self.collections.contains_key(&locale)
    }

    /// A new collection: `get_collection(locale)` with `custom` written over it.
    ///
    /// Custom entries always win, whatever their shape; keys unknown to the base
    /// collection are added. Neither input is modified.
    pub fn merge(&self, custom: &TemplateCollection, locale: Locale) -> TemplateCollection {
        self.get_collection(locale).overlaid_with(custom)
    }
}
