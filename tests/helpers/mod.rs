#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ndarray::{Array2, Array3};
use vietrag::embedding::pooling::TokenEmbeddings;
use vietrag::embedding::{
    CpuOnly, Device, EmbedError, EmbedResult, EmbeddingModelCache, EmbeddingProvider,
    EncodedBatch, EncoderModel, LoadPath, ModelHandle, ModelLoader, RetryPolicy, TextEncoder,
};

/// Width of the vectors produced by [`FakeModel`].
pub const TEST_DIM: usize = 16;

/// Char-level tokenizer: a leading id 1, then one id per char, padded with 0.
pub struct FakeEncoder;

impl TextEncoder for FakeEncoder {
    fn encode(&self, texts: &[String]) -> EmbedResult<EncodedBatch> {
        let rows: Vec<Vec<i64>> = texts
            .iter()
            .map(|t| {
                std::iter::once(1)
                    .chain(t.chars().map(|c| (c as i64 % 997) + 2))
                    .collect()
            })
            .collect();
        let seq_len = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((rows.len(), seq_len));
        let mut attention_mask = Array2::<i64>::zeros((rows.len(), seq_len));
        for (b, row) in rows.iter().enumerate() {
            for (s, id) in row.iter().enumerate() {
                input_ids[[b, s]] = *id;
                attention_mask[[b, s]] = 1;
            }
        }
        let token_type_ids = Array2::zeros((rows.len(), seq_len));

        Ok(EncodedBatch {
            input_ids,
            attention_mask,
            token_type_ids,
        })
    }
}

/// Shared counters and a queue of errors to return from `forward`, oldest first.
#[derive(Clone, Default)]
pub struct ModelProbe {
    pub forward_calls: Arc<AtomicUsize>,
    pub placements: Arc<Mutex<Vec<Device>>>,
    pub failures: Arc<Mutex<VecDeque<EmbedError>>>,
    /// Emit all-zero hidden states, as a row with nothing attended would pool to.
    pub zero_output: Arc<AtomicBool>,
}

impl ModelProbe {
    pub fn fail_next(&self, err: EmbedError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn forward_calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }
}

/// Deterministic hidden states derived from token ids.
pub struct FakeModel {
    pub dim: usize,
    pub probe: ModelProbe,
}

impl EncoderModel for FakeModel {
    fn place(&self, device: Device) -> EmbedResult<()> {
        let mut placements = self.probe.placements.lock().unwrap();
        if !placements.contains(&device) {
            placements.push(device);
        }
        Ok(())
    }

    fn forward(&self, _device: Device, batch: &EncodedBatch) -> EmbedResult<TokenEmbeddings> {
        self.probe.forward_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.probe.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let (b, s) = batch.input_ids.dim();
        if self.probe.zero_output.load(Ordering::SeqCst) {
            return Ok(TokenEmbeddings::F32(Array3::zeros((b, s, self.dim))));
        }
        let hidden = Array3::from_shape_fn((b, s, self.dim), |(i, j, d)| {
            let id = batch.input_ids[[i, j]] as f32;
            (id * (d as f32 + 1.0) * 0.37).sin()
        });
        Ok(TokenEmbeddings::F32(hidden))
    }
}

/// Loader that counts calls and can fail either load path.
#[derive(Clone)]
pub struct FakeLoader {
    pub dim: usize,
    pub loads: Arc<AtomicUsize>,
    pub paths: Arc<Mutex<Vec<LoadPath>>>,
    pub fail_fast: bool,
    pub fail_compatible: bool,
    pub delay: Duration,
    pub probe: ModelProbe,
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self {
            dim: TEST_DIM,
            loads: Arc::default(),
            paths: Arc::default(),
            fail_fast: false,
            fail_compatible: false,
            delay: Duration::ZERO,
            probe: ModelProbe::default(),
        }
    }
}

impl FakeLoader {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<LoadPath> {
        self.paths.lock().unwrap().clone()
    }
}

impl ModelLoader for FakeLoader {
    fn load(
        &self,
        model_id: &str,
        _credential: Option<&str>,
        path: LoadPath,
    ) -> EmbedResult<ModelHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().unwrap().push(path);
        std::thread::sleep(self.delay);

        let fail = match path {
            LoadPath::Fast => self.fail_fast,
            LoadPath::Compatible => self.fail_compatible,
        };
        if fail {
            return Err(EmbedError::Inference(format!("{path:?} init rejected the graph")));
        }

        Ok(ModelHandle::new(
            model_id,
            path,
            Box::new(FakeEncoder),
            Box::new(FakeModel {
                dim: self.dim,
                probe: self.probe.clone(),
            }),
        ))
    }
}

pub fn test_cache(loader: &FakeLoader) -> Arc<EmbeddingModelCache> {
    Arc::new(EmbeddingModelCache::new(Arc::new(loader.clone())))
}

/// Local provider over `loader` on CPU, with zero-delay retries.
pub fn test_provider(loader: &FakeLoader, declared_dim: usize) -> EmbeddingProvider {
    EmbeddingProvider::local(
        test_cache(loader),
        "test/model",
        None,
        Arc::new(CpuOnly),
        declared_dim,
    )
    .with_retry(RetryPolicy::immediate(3))
}

pub fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
