use vietrag::locale::detect::{self, DEFAULT_THRESHOLD};

/// Print the detected locale and the signals behind it.
pub fn detect(text: &str) {
    let locale = detect::detect(text);

    println!("Locale:            {} ({})", locale, locale.code());
    println!(
        "Diacritic ratio:   {}",
        if detect::is_locale(text, DEFAULT_THRESHOLD) {
            "above threshold"
        } else {
            "below threshold"
        }
    );
    println!(
        "Function words:    {}",
        if detect::contains_locale_keywords(text) {
            "found"
        } else {
            "none"
        }
    );
}
