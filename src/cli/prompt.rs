use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use vietrag::config::VietragConfig;
use vietrag::locale::Locale;
use vietrag::prompt::{resolve_effective_locale, PromptResolver, PromptTemplate, TemplateCollection, TemplateStore};

/// Resolve a template and print it to stdout.
pub fn prompt(
    config: &VietragConfig,
    key: &str,
    language: Option<&str>,
    sample: Option<&str>,
    params: &[String],
) -> Result<()> {
    let store = TemplateStore::builtin().context("built-in templates are invalid")?;

    let overrides = match config.prompts.custom_path.as_deref() {
        Some(path) => {
            let path = vietrag::config::expand_tilde(path);
            TemplateCollection::from_toml_file(&path)?
        }
        None => TemplateCollection::default(),
    };
    let resolver = PromptResolver::with_overrides(Arc::new(store), overrides);

    let locale = match language {
        Some(name) => Locale::canonicalize(name),
        None => resolve_effective_locale(config, sample.unwrap_or_default()),
    };
    let params = parse_params(params)?;

    let Some(resolution) = resolver.resolve_detailed(key, Some(locale), None, &params) else {
        anyhow::bail!("no template named '{key}' in {locale} or the default locale");
    };

    if resolution.from_default {
        tracing::info!(key, %locale, "template taken from the default locale");
    }
    if resolution.substitution.fell_back() {
        eprintln!(
            "warning: parameters not applied ({:?}); printing the template unformatted",
            resolution.substitution
        );
    }

    match resolution.template {
        PromptTemplate::Text(text) => println!("{text}"),
        PromptTemplate::Examples(examples) => {
            for (i, example) in examples.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                println!("{example}");
            }
        }
    }

    Ok(())
}

/// `name=value` pairs; the value may itself contain `=`.
fn parse_params(raw: &[String]) -> Result<HashMap<String, String>> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .with_context(|| format!("invalid parameter '{pair}', expected name=value"))
        })
        .collect()
}
