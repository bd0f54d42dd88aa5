use anyhow::{Context, Result};

use vietrag::config::VietragConfig;

/// Embed each text and print one JSON array per line.
pub async fn embed(config: &VietragConfig, texts: Vec<String>) -> Result<()> {
    let provider = vietrag::embedding::create_provider(config)?;

    let vectors = provider
        .embed(&texts)
        .await
        .with_context(|| format!("failed to embed {} text(s) with {}", texts.len(), provider.model_id()))?;

    for vector in &vectors {
        println!("{}", serde_json::to_string(vector)?);
    }

    tracing::info!(
        count = vectors.len(),
        dim = provider.embedding_dim(),
        "embeddings written"
    );
    Ok(())
}
