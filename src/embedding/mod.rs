//! Text-to-vector embedding pipeline.
//!
//! [`EmbeddingProvider`] turns a batch of texts into L2-normalized vectors of a
//! fixed declared dimension, either with a locally cached ONNX model or through a
//! hosted feature-extraction API. Transient failures are retried per
//! [`RetryPolicy`]; everything else is returned to the caller unchanged.
//! The provider is created via [`create_provider`] from configuration.

pub mod cache;
pub mod device;
pub mod error;
pub mod handle;
pub mod hub;
pub mod local;
pub mod pooling;
pub mod remote;
pub mod retry;

use std::sync::Arc;

pub use cache::{EmbeddingModelCache, ModelLoader};
pub use device::{select_device, CpuOnly, Device, DeviceProbe, OrtDeviceProbe};
pub use error::{EmbedError, EmbedResult};
pub use handle::{EncodedBatch, EncoderModel, LoadPath, ModelHandle, TextEncoder};
pub use remote::RemoteBackend;
pub use retry::RetryPolicy;

use crate::config::VietragConfig;

enum Backend {
    Local {
        cache: Arc<EmbeddingModelCache>,
        model_id: String,
        credential: Option<String>,
        probe: Arc<dyn DeviceProbe>,
    },
    Remote(RemoteBackend),
}

pub struct EmbeddingProvider {
    backend: Backend,
    embedding_dim: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("mode", &self.mode())
            .field("model_id", &self.model_id())
            .field("embedding_dim", &self.embedding_dim)
            .finish_non_exhaustive()
    }
}

impl EmbeddingProvider {
    /// Embed with a model from `cache`, placed on the best device `probe` reports.
    pub fn local(
        cache: Arc<EmbeddingModelCache>,
        model_id: impl Into<String>,
        credential: Option<String>,
        probe: Arc<dyn DeviceProbe>,
        embedding_dim: usize,
    ) -> Self {
        Self {
            backend: Backend::Local {
                cache,
                model_id: model_id.into(),
                credential,
                probe,
            },
            embedding_dim,
            retry: RetryPolicy::default(),
        }
    }

    pub fn remote(backend: RemoteBackend, embedding_dim: usize) -> Self {
        Self {
            backend: Backend::Remote(backend),
            embedding_dim,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Declared width of every vector this provider returns.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn mode(&self) -> &'static str {
        match self.backend {
            Backend::Local { .. } => "local",
            Backend::Remote(_) => "remote",
        }
    }

    pub fn model_id(&self) -> &str {
        match &self.backend {
            Backend::Local { model_id, .. } => model_id,
            Backend::Remote(remote) => remote.model_id(),
        }
    }

    /// One unit-norm vector of [`Self::embedding_dim`] per input text, in input order.
    ///
    /// A vector that cannot be normalized is an [`EmbedError::Inference`], never
    /// a zero vector.
    ///
    /// The whole batch is one attempt: a transient failure retries every text.
    pub async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(EmbedError::InvalidInput(
                "embedding request must contain at least one text".into(),
            ));
        }

        let vectors = self
            .retry
            .run(|attempt| async move {
                tracing::debug!(attempt, count = texts.len(), mode = self.mode(), "embedding batch");
                self.embed_once(texts).await
            })
            .await?;

        if vectors.len() != texts.len() {
            return Err(EmbedError::Inference(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.embedding_dim) {
            return Err(EmbedError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: bad.len(),
            });
        }
        if let Some(index) = vectors.iter().position(|v| !pooling::is_unit_norm(v)) {
            return Err(EmbedError::Inference(format!(
                "embedding {index} could not be normalized (no attended tokens or non-finite output)"
            )));
        }

        Ok(vectors)
    }

    async fn embed_once(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        match &self.backend {
            Backend::Local {
                cache,
                model_id,
                credential,
                probe,
            } => {
                let handle = cache.get_or_load(model_id, credential.as_deref()).await?;
                let device = select_device(probe.as_ref());
                let texts = texts.to_vec();

                // Tokenization and inference are CPU-bound.
                let rows = tokio::task::spawn_blocking(move || handle.embed_batch(device, &texts))
                    .await??;

                Ok(rows.outer_iter().map(|row| row.to_vec()).collect())
            }
            Backend::Remote(remote) => remote.embed(texts).await,
        }
    }
}

/// Create an embedding provider from config.
///
/// `"local"` uses the process-wide ONNX model cache; `"remote"` uses the hosted
/// feature-extraction API. Neither checks credentials or model files here: that
/// happens on the first `embed`.
pub fn create_provider(config: &VietragConfig) -> EmbedResult<EmbeddingProvider> {
    let embedding = &config.embedding;
    let credential = hub::credential_from_env();

    let provider = match embedding.provider.as_str() {
        "local" => EmbeddingProvider::local(
            EmbeddingModelCache::shared(embedding),
            embedding.model.clone(),
            credential,
            Arc::new(OrtDeviceProbe),
            embedding.embedding_dim,
        ),
        "remote" => EmbeddingProvider::remote(
            RemoteBackend::new(embedding, credential)?,
            embedding.embedding_dim,
        ),
        other => {
            return Err(EmbedError::Configuration(format!(
                "unknown embedding provider: {other}. Supported: local, remote"
            )))
        }
    };

    tracing::info!(
        mode = provider.mode(),
        model = provider.model_id(),
        dim = provider.embedding_dim(),
        "embedding provider ready"
    );
    Ok(provider.with_retry(config.retry.policy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let mut config = VietragConfig::default();
        config.embedding.provider = "openai".into();
        let err = create_provider(&config).unwrap_err();
        assert!(matches!(err, EmbedError::Configuration(_)));
    }

    #[test]
    fn remote_provider_keeps_declared_dim() {
        let mut config = VietragConfig::default();
        config.embedding.provider = "remote".into();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.mode(), "remote");
        assert_eq!(provider.model_id(), "BAAI/bge-m3");
        assert_eq!(provider.embedding_dim(), 1024);
    }

    #[tokio::test]
    async fn empty_request_is_rejected_before_any_attempt() {
        let mut config = VietragConfig::default();
        config.embedding.provider = "remote".into();
        let provider = create_provider(&config).unwrap();
        let err = provider.embed(&[]).await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidInput(_)));
    }
}
