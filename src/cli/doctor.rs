//! CLI `doctor` command: check configuration, model files, and vector stores.

use anyhow::Result;

use vietrag::config::VietragConfig;
use vietrag::embedding::hub::{self, ModelFiles};
use vietrag::embedding::remote::remote_model_for;
use vietrag::locale::format::format_integer;
use vietrag::locale::Locale;
use vietrag::vdb;

/// Print a health report. Returns `false` when a vector store disagrees with the
/// configured embedding dimension or cannot be read.
pub fn doctor(config: &VietragConfig) -> Result<bool> {
    let embedding = &config.embedding;
    let expected = embedding.embedding_dim;
    let language = config
        .addon_params
        .language
        .as_deref()
        .map(Locale::canonicalize);

    println!("vietrag Health Report");
    println!("=====================");
    println!();
    println!("Prompt language:   {}", match language {
        Some(locale) => locale.to_string(),
        None => "(detect from query)".into(),
    });
    println!();
    println!("Embedding:");
    println!("  Provider:        {}", embedding.provider);
    println!("  Model:           {}", embedding.model);
    println!("  Dimension:       {expected}");
    println!(
        "  Access token:    {}",
        if hub::credential_from_env().is_some() { "found" } else { "not set" }
    );

    match embedding.provider.as_str() {
        "remote" => {
            let remote = remote_model_for(&embedding.model);
            if remote != embedding.model {
                println!("  Remote model:    {remote} (substituted)");
            }
        }
        _ => {
            let files = ModelFiles::new(&config.resolved_cache_dir(), &embedding.model, &embedding.onnx_file);
            if files.exist() {
                println!("  Model files:     OK ({})", files.dir.display());
            } else {
                println!("  Model files:     missing. Run `vietrag model download`.");
            }
        }
    }

    let working_dir = config.resolved_working_dir();
    let report = vdb::inspect(&working_dir)?;

    println!();
    println!("Vector stores:     {}", working_dir.display());
    if report.is_empty() {
        println!("  (none found, fresh start)");
        return Ok(true);
    }

    for store in &report.stores {
        let dim = store
            .embedding_dim
            .map_or_else(|| "unknown".to_string(), |d| d.to_string());
        let modified = store
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {:<28} dim {:<8} {:>10} records  {}",
            store.file_name(),
            dim,
            format_integer(store.records as i64, Locale::English),
            modified
        );
        if store.mismatches(expected) {
            println!("    MISMATCH: expected {expected}");
        }
    }
    for bad in &report.unreadable {
        println!("  {} unreadable: {:#}", bad.path.display(), bad.error);
    }

    println!();
    if report.is_compatible(expected) {
        println!("Dimension check:   PASSED");
        Ok(true)
    } else {
        println!("Dimension check:   FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Back up {}", working_dir.display());
        println!("  2. Remove it and re-index your documents with the configured model,");
        println!("     or set [embedding] model/embedding_dim to match the stored vectors.");
        Ok(false)
    }
}
