//! Locale identifiers and language handling.
//!
//! [`Locale`] is the canonical language tag that drives template and number
//! formatting selection. Detection lives in [`detect`], formatting in [`format`].

pub mod detect;
pub mod format;

use serde::{Deserialize, Serialize};

/// Spellings and abbreviations that canonicalize to [`Locale::Vietnamese`].
const VIETNAMESE_ALIASES: &[&str] = &[
    "vietnamese",
    "việt nam",
    "tiếng việt",
    "vi",
    "vie",
    "vn",
    "viet",
];

/// A canonical language identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Locale {
    English,
    Vietnamese,
}

impl Locale {
    /// The locale used when nothing else matches.
    pub const DEFAULT: Locale = Locale::English;

    /// Map any spelling to a locale. Total: unknown input yields [`Locale::DEFAULT`].
    pub fn canonicalize(name: &str) -> Locale {
        let normalized = name.trim().to_lowercase();
        if VIETNAMESE_ALIASES.contains(&normalized.as_str()) {
            Locale::Vietnamese
        } else {
            Locale::DEFAULT
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Vietnamese => "Vietnamese",
        }
    }

    /// Key used for this locale's section in template files.
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Vietnamese => "vi",
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Locale {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::canonicalize(s))
    }
}
