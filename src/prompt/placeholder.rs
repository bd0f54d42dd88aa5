//! `{name}` placeholder substitution for text templates.

use std::collections::HashMap;

/// Why a template could not be filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillError {
    /// The template names a placeholder that has no value.
    Missing(String),
    /// Unbalanced or empty braces, or a placeholder that is not an identifier.
    Malformed,
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Replace every `{name}` in `template` with `params[name]`.
///
/// `{{` and `}}` produce literal braces. All-or-nothing: any missing name or
/// malformed brace fails the whole fill, so callers never see partial output.
pub fn fill(template: &str, params: &HashMap<String, String>) -> Result<String, FillError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(FillError::Malformed),
                        Some(ch) => name.push(ch),
                    }
                }
                if !is_placeholder_name(&name) {
                    return Err(FillError::Malformed);
                }
                match params.get(&name) {
                    Some(value) => out.push_str(value),
                    None => return Err(FillError::Missing(name)),
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(FillError::Malformed),
            other => out.push(other),
        }
    }

    Ok(out)
}
