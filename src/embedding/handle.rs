//! The loaded model/tokenizer pair and the seams it is built from.

use ndarray::Array2;

use super::device::Device;
use super::error::{EmbedError, EmbedResult};
use super::pooling::{self, TokenEmbeddings};

/// Tokenized, padded batch. All arrays are `(batch, seq_len)`.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub token_type_ids: Array2<i64>,
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Turns text into token ids, truncating every input to a fixed length.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, texts: &[String]) -> EmbedResult<EncodedBatch>;
}

/// Runs the transformer and returns per-token hidden states.
pub trait EncoderModel: Send + Sync {
    /// Prepare the model for `device`. Idempotent: placing twice is a no-op.
    fn place(&self, device: Device) -> EmbedResult<()>;

    /// Forward pass without gradient bookkeeping, shape `(batch, seq_len, hidden)`.
    fn forward(&self, device: Device, batch: &EncodedBatch) -> EmbedResult<TokenEmbeddings>;
}

/// Which initialization path produced a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// Optimized, multi-threaded initialization.
    Fast,
    /// Slower initialization that works for graphs the fast path rejects.
    Compatible,
}

/// A loaded model and its tokenizer, owned by the model cache.
pub struct ModelHandle {
    model_id: String,
    load_path: LoadPath,
    encoder: Box<dyn TextEncoder>,
    model: Box<dyn EncoderModel>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("load_path", &self.load_path)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn new(
        model_id: impl Into<String>,
        load_path: LoadPath,
        encoder: Box<dyn TextEncoder>,
        model: Box<dyn EncoderModel>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            load_path,
            encoder,
            model,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn load_path(&self) -> LoadPath {
        self.load_path
    }

    /// Tokenize, run, mean-pool and normalize one batch on `device`.
    ///
    /// Blocking; async callers run it on the blocking pool.
    pub fn embed_batch(&self, device: Device, texts: &[String]) -> EmbedResult<Array2<f32>> {
        if texts.is_empty() {
            return Err(EmbedError::InvalidInput("embedding request is empty".into()));
        }

        // Step 1: Tokenize
        let batch = self.encoder.encode(texts)?;
        if batch.batch_size() != texts.len() {
            return Err(EmbedError::Inference(format!(
                "tokenizer returned {} rows for {} texts",
                batch.batch_size(),
                texts.len()
            )));
        }

        // Step 2: Forward pass
        self.model.place(device)?;
        let token_embeddings = self.model.forward(device, &batch)?.into_f32();

        // Step 3: Mean pooling with attention mask, then L2 normalize
        let pooled = pooling::mean_pool(&token_embeddings, batch.attention_mask.view())?;
        Ok(pooling::l2_normalize_rows(pooled))
    }
}
