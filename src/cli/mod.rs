pub mod detect;
pub mod doctor;
pub mod embed;
pub mod prompt;

use anyhow::Result;

use vietrag::config::EmbeddingConfig;
use vietrag::embedding::hub::{self, ModelFiles};

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = vietrag::config::expand_tilde(&config.cache_dir);
    let files = ModelFiles::new(&cache_dir, &config.model, &config.onnx_file);

    if files.exist() {
        println!("Model already exists at {}", files.dir.display());
        return Ok(());
    }

    println!("Downloading {} to {}...", config.model, files.dir.display());
    let credential = hub::credential_from_env();
    hub::download_model_files(&files, &config.model, credential.as_deref()).await?;

    println!("Model saved to {}", files.model.display());
    println!("Tokenizer saved to {}", files.tokenizer.display());
    println!("Model download complete. Ready for use.");
    Ok(())
}
