//! Local ONNX Runtime model loading and inference.
//!
//! [`OnnxModelLoader`] turns a model id into a [`ModelHandle`] backed by a
//! `tokenizers` tokenizer and one `ort` session per device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array2, Array3};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::cache::ModelLoader;
use super::device::Device;
use super::error::{EmbedError, EmbedResult};
use super::handle::{EncodedBatch, EncoderModel, LoadPath, ModelHandle, TextEncoder};
use super::hub::{self, ModelFiles};
use super::pooling::TokenEmbeddings;
use crate::config::EmbeddingConfig;

fn ort_err(e: impl std::fmt::Display) -> EmbedError {
    EmbedError::Inference(e.to_string())
}

/// Loads ONNX exports of sentence-embedding models from the local cache,
/// fetching missing files from the Hub first.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    cache_dir: PathBuf,
    onnx_file: String,
    max_length: usize,
    token_type_ids: bool,
}

impl OnnxModelLoader {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            cache_dir: crate::config::expand_tilde(&config.cache_dir),
            onnx_file: config.onnx_file.clone(),
            max_length: config.max_length,
            token_type_ids: config.token_type_ids,
        }
    }

    fn ensure_files(&self, model_id: &str, credential: Option<&str>) -> EmbedResult<ModelFiles> {
        let files = ModelFiles::new(&self.cache_dir, model_id, &self.onnx_file);
        if files.exist() {
            return Ok(files);
        }

        // Called from the blocking pool, so blocking on the runtime here is fine.
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EmbedError::Configuration(format!(
                "model files missing under {} and no async runtime to download them; \
                 run `vietrag model download` first",
                files.dir.display()
            ))
        })?;
        runtime
            .block_on(hub::download_model_files(&files, model_id, credential))
            .map_err(|e| EmbedError::Connection(format!("{e:#}")))?;
        Ok(files)
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(
        &self,
        model_id: &str,
        credential: Option<&str>,
        path: LoadPath,
    ) -> EmbedResult<ModelHandle> {
        let files = self.ensure_files(model_id, credential)?;

        let tokenizer = HfTokenizer::from_file(&files.tokenizer, self.max_length)?;
        tracing::info!(tokenizer = %files.tokenizer.display(), "tokenizer loaded");

        let model = OnnxEncoder::from_file(&files.model, path, self.token_type_ids)?;
        tracing::info!(model = %files.model.display(), ?path, "ONNX model loaded");

        Ok(ModelHandle::new(
            model_id,
            path,
            Box::new(tokenizer),
            Box::new(model),
        ))
    }
}

/// `tokenizers` tokenizer with truncation and batch-longest padding.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path, max_length: usize) -> EmbedResult<Self> {
        let load_err = |e: tokenizers::Error| EmbedError::ModelLoad {
            model_id: path.display().to_string(),
            reason: format!("failed to load tokenizer: {e}"),
        };

        let mut tokenizer = Tokenizer::from_file(path).map_err(load_err)?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(load_err)?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self { tokenizer })
    }
}

impl TextEncoder for HfTokenizer {
    fn encode(&self, texts: &[String]) -> EmbedResult<EncodedBatch> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| EmbedError::InvalidInput(format!("tokenization failed: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
            token_type_ids.extend(encoding.get_type_ids().iter().map(|&t| t as i64));
        }

        let shape = (batch_size, seq_len);
        let to_array = |data: Vec<i64>| {
            Array2::from_shape_vec(shape, data)
                .map_err(|e| EmbedError::Inference(format!("ragged tokenizer output: {e}")))
        };

        Ok(EncodedBatch {
            input_ids: to_array(input_ids)?,
            attention_mask: to_array(attention_mask)?,
            token_type_ids: to_array(token_type_ids)?,
        })
    }
}

/// ONNX transformer encoder with one lazily built session per device.
pub struct OnnxEncoder {
    model_path: PathBuf,
    load_path: LoadPath,
    token_type_ids: bool,
    sessions: Mutex<HashMap<Device, Session>>,
}

// Safety: sessions are only reached through the Mutex, which guarantees
// exclusive access during run().
unsafe impl Send for OnnxEncoder {}
unsafe impl Sync for OnnxEncoder {}

impl OnnxEncoder {
    /// Build a CPU session from the graph at `path` to validate it. Sessions load
    /// from the file so an external-data sidecar next to it is resolved.
    pub fn from_file(path: &Path, load_path: LoadPath, token_type_ids: bool) -> EmbedResult<Self> {
        if !path.is_file() {
            return Err(EmbedError::ModelLoad {
                model_id: path.display().to_string(),
                reason: "ONNX model file not found".into(),
            });
        }

        let encoder = Self {
            model_path: path.to_path_buf(),
            load_path,
            token_type_ids,
            sessions: Mutex::new(HashMap::new()),
        };
        encoder.place(Device::Cpu)?;
        Ok(encoder)
    }

    fn build_session(&self, device: Device) -> EmbedResult<Session> {
        let builder = Session::builder()
            .map_err(ort_err)?
            .with_execution_providers([device.execution_provider()])
            .map_err(ort_err)?;

        let builder = match self.load_path {
            LoadPath::Fast => builder
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(ort_err)?
                .with_intra_threads(4)
                .map_err(ort_err)?,
            LoadPath::Compatible => builder
                .with_optimization_level(GraphOptimizationLevel::Disable)
                .map_err(ort_err)?,
        };

        builder.commit_from_file(&self.model_path).map_err(ort_err)
    }

    fn lock_sessions(&self) -> EmbedResult<std::sync::MutexGuard<'_, HashMap<Device, Session>>> {
        self.sessions
            .lock()
            .map_err(|e| EmbedError::Inference(format!("session lock poisoned: {e}")))
    }
}

impl EncoderModel for OnnxEncoder {
    fn place(&self, device: Device) -> EmbedResult<()> {
        let mut sessions = self.lock_sessions()?;
        if !sessions.contains_key(&device) {
            let session = self.build_session(device)?;
            tracing::debug!(%device, "ONNX session created");
            sessions.insert(device, session);
        }
        Ok(())
    }

    fn forward(&self, device: Device, batch: &EncodedBatch) -> EmbedResult<TokenEmbeddings> {
        let (batch_size, seq_len) = batch.input_ids.dim();
        let shape = vec![batch_size as i64, seq_len as i64];
        let tensor = |data: &Array2<i64>| {
            let flat: Vec<i64> = data.iter().copied().collect();
            Tensor::from_array((shape.clone(), flat.into_boxed_slice())).map_err(ort_err)
        };
        let input_ids = tensor(&batch.input_ids)?;
        let attention_mask = tensor(&batch.attention_mask)?;

        let mut sessions = self.lock_sessions()?;
        let session = sessions.get_mut(&device).ok_or_else(|| {
            EmbedError::Inference(format!("model not placed on {device}"))
        })?;

        // BERT-style graphs take segment ids; XLM-R style graphs reject them.
        let run = if self.token_type_ids {
            let token_type_ids = tensor(&batch.token_type_ids)?;
            session.run(ort::inputs! {
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            })
        } else {
            session.run(ort::inputs! {
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            })
        };
        let outputs = run.map_err(ort_err)?;

        // The output name varies by ONNX export. Try common names, fall back to index 0.
        let value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
            return Array3::from_shape_vec(hidden_dims(&shape)?, data.to_vec())
                .map(TokenEmbeddings::F32)
                .map_err(shape_err);
        }
        if let Ok((shape, data)) = value.try_extract_tensor::<half::f16>() {
            return Array3::from_shape_vec(hidden_dims(&shape)?, data.to_vec())
                .map(TokenEmbeddings::F16)
                .map_err(shape_err);
        }
        let (shape, data) = value.try_extract_tensor::<half::bf16>().map_err(|e| {
            EmbedError::Inference(format!("unsupported token embedding tensor type: {e}"))
        })?;
        Array3::from_shape_vec(hidden_dims(&shape)?, data.to_vec())
            .map(TokenEmbeddings::BF16)
            .map_err(shape_err)
    }
}

fn hidden_dims(dims: &[i64]) -> EmbedResult<(usize, usize, usize)> {
    match dims {
        [b, s, h] => Ok((*b as usize, *s as usize, *h as usize)),
        other => Err(EmbedError::Inference(format!(
            "unexpected token embedding shape {other:?}, expected [batch, seq, hidden]"
        ))),
    }
}

fn shape_err(e: ndarray::ShapeError) -> EmbedError {
    EmbedError::Inference(e.to_string())
}
