//! Character-set and keyword heuristics for spotting Vietnamese text.

use super::Locale;

/// Default minimum ratio of Vietnamese letters to all letters for [`is_locale`].
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Letters that only occur in Vietnamese orthography (tone-marked vowels and đ).
const VIETNAMESE_CHARS: &str = "àáạảãâầấậẩẫăằắặẳẵèéẹẻẽêềếệểễìíịỉĩòóọỏõôồốộổỗơờớợởỡùúụủũưừứựửữỳýỵỷỹđ\
ÀÁẠẢÃÂẦẤẬẨẪĂẰẮẶẲẴÈÉẸẺẼÊỀẾỆỂỄÌÍỊỈĨÒÓỌỎÕÔỒỐỘỔỖƠỜỚỢỞỠÙÚỤỦŨƯỪỨỰỬỮỲÝỴỶỸĐ";

const QUESTION_WORDS: &[&str] = &[
    "là gì",
    "như thế nào",
    "tại sao",
    "ở đâu",
    "khi nào",
    "ai",
    "bao nhiêu",
    "thế nào",
];

const REFERENCE_WORDS: &[&str] = &["tài liệu tham khảo", "nguồn", "trích dẫn"];

const COMMON_WORDS: &[&str] = &[
    "và", "của", "có", "được", "với", "từ", "trong", "cho", "về", "này", "đó",
];

fn is_vietnamese_char(c: char) -> bool {
    VIETNAMESE_CHARS.contains(c)
}

/// Classify `text`: Vietnamese if it contains any Vietnamese-specific letter.
pub fn detect(text: &str) -> Locale {
    if text.chars().any(is_vietnamese_char) {
        Locale::Vietnamese
    } else {
        Locale::DEFAULT
    }
}

/// Whether the share of Vietnamese-specific letters among all alphabetic
/// characters reaches `threshold`. Empty or letterless input is never Vietnamese.
pub fn is_locale(text: &str, threshold: f64) -> bool {
    let (marked, letters) = text.chars().fold((0usize, 0usize), |(marked, letters), c| {
        (
            marked + usize::from(is_vietnamese_char(c)),
            letters + usize::from(c.is_alphabetic()),
        )
    });

    if letters == 0 {
        return false;
    }

    marked as f64 / letters as f64 >= threshold
}

/// Case-insensitive search for common Vietnamese function words and phrases.
///
/// Catches Vietnamese typed with diacritics stripped from most words, where
/// [`is_locale`] falls under its threshold.
pub fn contains_locale_keywords(text: &str) -> bool {
    let lower = text.to_lowercase();
    QUESTION_WORDS
        .iter()
        .chain(REFERENCE_WORDS)
        .chain(COMMON_WORDS)
        .any(|keyword| lower.contains(keyword))
}
