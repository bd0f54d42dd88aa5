//! Process-wide cache of loaded embedding models with single-flight loading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::OnceCell;

use super::error::{EmbedError, EmbedResult};
use super::handle::{LoadPath, ModelHandle};
use super::local::OnnxModelLoader;
use crate::config::EmbeddingConfig;

static SHARED: OnceLock<Arc<EmbeddingModelCache>> = OnceLock::new();

/// Builds a [`ModelHandle`] along one initialization path. Blocking.
pub trait ModelLoader: Send + Sync + 'static {
    fn load(
        &self,
        model_id: &str,
        credential: Option<&str>,
        path: LoadPath,
    ) -> EmbedResult<ModelHandle>;
}

type Slot = Arc<OnceCell<Arc<ModelHandle>>>;

/// Holds at most one loaded handle per model id.
///
/// Concurrent first requests for the same id share a single load: one caller
/// runs the loader, the rest wait on the same slot and receive the same
/// `Arc<ModelHandle>`. A failed load leaves the slot empty, so the next request
/// starts over; the cache itself never retries.
pub struct EmbeddingModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for EmbeddingModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingModelCache")
            .field("loaded", &self.loaded_models())
            .finish_non_exhaustive()
    }
}

impl EmbeddingModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide cache backed by [`OnnxModelLoader`]. The first caller's
    /// config builds it; later configs are ignored.
    pub fn shared(config: &EmbeddingConfig) -> Arc<Self> {
        let cache = SHARED.get_or_init(|| {
            tracing::debug!(cache_dir = %config.cache_dir, "initializing shared model cache");
            Arc::new(Self::new(Arc::new(OnnxModelLoader::new(config))))
        });
        Arc::clone(cache)
    }

    /// The loaded handle for `model_id`, loading it first if needed.
    pub async fn get_or_load(
        &self,
        model_id: &str,
        credential: Option<&str>,
    ) -> EmbedResult<Arc<ModelHandle>> {
        let slot = self.slot(model_id);

        slot.get_or_try_init(|| async {
            let loader = Arc::clone(&self.loader);
            let model_id = model_id.to_string();
            let credential = credential.map(str::to_string);
            let handle = tokio::task::spawn_blocking(move || {
                load_with_fallback(loader.as_ref(), &model_id, credential.as_deref())
            })
            .await??;
            Ok::<_, EmbedError>(Arc::new(handle))
        })
        .await
        .cloned()
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.lock_slots()
            .get(model_id)
            .is_some_and(|slot| slot.initialized())
    }

    pub fn loaded_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock_slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn slot(&self, model_id: &str) -> Slot {
        Arc::clone(self.lock_slots().entry(model_id.to_string()).or_default())
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // The map only ever gains entries, so a poisoned guard is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Try the fast path, then the compatible path. Only a failure of both is fatal.
fn load_with_fallback(
    loader: &dyn ModelLoader,
    model_id: &str,
    credential: Option<&str>,
) -> EmbedResult<ModelHandle> {
    tracing::info!(model = model_id, "loading embedding model");

    let fast_err = match loader.load(model_id, credential, LoadPath::Fast) {
        Ok(handle) => {
            tracing::info!(model = model_id, path = "fast", "embedding model loaded");
            return Ok(handle);
        }
        Err(err) => err,
    };

    // Missing credentials or settings fail every path the same way.
    if let EmbedError::Configuration(_) = fast_err {
        return Err(fast_err);
    }

    tracing::warn!(
        model = model_id,
        error = %fast_err,
        "fast model initialization failed, falling back to compatible path"
    );

    match loader.load(model_id, credential, LoadPath::Compatible) {
        Ok(handle) => {
            tracing::info!(model = model_id, path = "compatible", "embedding model loaded");
            Ok(handle)
        }
        Err(err) => {
            tracing::error!(model = model_id, error = %err, "failed to load embedding model");
            Err(EmbedError::ModelLoad {
                model_id: model_id.to_string(),
                reason: format!("fast path: {fast_err}; compatible path: {err}"),
            })
        }
    }
}
