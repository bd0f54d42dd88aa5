//! Hosted feature-extraction backend.
//!
//! Sends one `POST {base_url}/models/{model}` per text with `{"inputs": text}` and
//! mean-pools whatever nesting of vectors comes back.

use std::time::Duration;

use serde_json::Value;

use super::error::{EmbedError, EmbedResult};
use super::hub;
use super::pooling::l2_normalize;
use crate::config::EmbeddingConfig;

/// Models the hosted API does not serve for feature extraction, with a
/// compatible stand-in that shares their architecture and dimension.
const FEATURE_EXTRACTION_ALIASES: &[(&str, &str)] =
    &[("AITeamVN/Vietnamese_Embedding", "BAAI/bge-m3")];

/// The model actually requested from the hosted API for `model_id`.
pub fn remote_model_for(model_id: &str) -> &str {
    FEATURE_EXTRACTION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model_id)
        .map_or(model_id, |(_, replacement)| replacement)
}

#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    credential: Option<String>,
}

impl RemoteBackend {
    /// The credential is only checked on the first request.
    pub fn new(config: &EmbeddingConfig, credential: Option<String>) -> EmbedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EmbedError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let model_id = remote_model_for(&config.model).to_string();
        if model_id != config.model {
            tracing::warn!(
                requested = %config.model,
                using = %model_id,
                "model is not served for feature extraction, substituting compatible model"
            );
        }

        let endpoint = format!(
            "{}/models/{}",
            config.remote_base_url.trim_end_matches('/'),
            model_id
        );

        Ok(Self {
            client,
            endpoint,
            model_id,
            credential,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One request per text, in input order.
    pub async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let token = hub::require_credential(self.credential.as_deref())?;

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text, &token).await?);
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str, token: &str) -> EmbedResult<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), body = %body, "feature extraction failed");
            return Err(classify(Some(status.as_u16()), &format!("HTTP {status}: {body}")));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| EmbedError::Inference(format!("invalid JSON response: {e}")))?;
        let pooled = pool_response(&value)?;
        Ok(l2_normalize(&pooled))
    }
}

/// Map an HTTP status and error text onto the retry taxonomy.
pub fn classify(status: Option<u16>, message: &str) -> EmbedError {
    let lower = message.to_lowercase();
    let message = message.to_string();

    if status == Some(429) || lower.contains("rate limit") {
        EmbedError::RateLimit(message)
    } else if matches!(status, Some(408) | Some(504))
        || lower.contains("timeout")
        || lower.contains("timed out")
    {
        EmbedError::Timeout(message)
    } else if status.is_some_and(|s| s >= 500) || lower.contains("connection") {
        EmbedError::Connection(message)
    } else {
        EmbedError::Inference(message)
    }
}

fn classify_transport(e: reqwest::Error) -> EmbedError {
    if e.is_timeout() {
        EmbedError::Timeout(e.to_string())
    } else if e.is_connect() {
        EmbedError::Connection(e.to_string())
    } else {
        classify(e.status().map(|s| s.as_u16()), &e.to_string())
    }
}

/// Accepts `[d]`, `[[d]...]` or deeper token-level nesting; averages every
/// innermost vector.
pub fn pool_response(value: &Value) -> EmbedResult<Vec<f32>> {
    let mut leaves = Vec::new();
    collect_leaf_vectors(value, &mut leaves)?;

    let dim = match leaves.first() {
        Some(first) if !first.is_empty() => first.len(),
        _ => return Err(EmbedError::Inference("empty embedding in response".into())),
    };
    if let Some(bad) = leaves.iter().find(|leaf| leaf.len() != dim) {
        return Err(EmbedError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }

    let mut acc = vec![0.0f32; dim];
    for leaf in &leaves {
        for (a, x) in acc.iter_mut().zip(leaf) {
            *a += *x;
        }
    }
    let n = leaves.len() as f32;
    acc.iter_mut().for_each(|a| *a /= n);
    Ok(acc)
}

fn collect_leaf_vectors(value: &Value, leaves: &mut Vec<Vec<f32>>) -> EmbedResult<()> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_number) => {
            let leaf = items
                .iter()
                .filter_map(Value::as_f64)
                .map(|x| x as f32)
                .collect();
            leaves.push(leaf);
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| collect_leaf_vectors(item, leaves)),
        Value::Object(map) if map.contains_key("error") => {
            Err(classify(None, &map["error"].to_string()))
        }
        other => Err(EmbedError::Inference(format!(
            "expected numeric arrays in response, got: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_classification() {
        assert!(matches!(classify(Some(429), "Too Many Requests"), EmbedError::RateLimit(_)));
        assert!(matches!(classify(Some(408), ""), EmbedError::Timeout(_)));
        assert!(matches!(classify(Some(504), "Gateway"), EmbedError::Timeout(_)));
        assert!(matches!(classify(Some(503), "loading"), EmbedError::Connection(_)));
        assert!(matches!(classify(Some(400), "bad input"), EmbedError::Inference(_)));
        assert!(matches!(classify(Some(401), "unauthorized"), EmbedError::Inference(_)));
    }

    #[test]
    fn text_classification() {
        assert!(matches!(
            classify(None, "Rate limit reached for this model"),
            EmbedError::RateLimit(_)
        ));
        assert!(matches!(classify(None, "operation timed out"), EmbedError::Timeout(_)));
        assert!(matches!(classify(None, "Connection reset by peer"), EmbedError::Connection(_)));
        assert!(matches!(classify(None, "shape error"), EmbedError::Inference(_)));
    }

    #[test]
    fn known_alias_is_substituted() {
        assert_eq!(remote_model_for("AITeamVN/Vietnamese_Embedding"), "BAAI/bge-m3");
        assert_eq!(remote_model_for("BAAI/bge-m3"), "BAAI/bge-m3");
        assert_eq!(
            remote_model_for("intfloat/multilingual-e5-large"),
            "intfloat/multilingual-e5-large"
        );
    }

    #[test]
    fn backend_uses_substituted_endpoint() {
        let config = EmbeddingConfig {
            remote_base_url: "https://example.test/".into(),
            ..EmbeddingConfig::default()
        };
        let backend = RemoteBackend::new(&config, None).unwrap();
        assert_eq!(backend.model_id(), "BAAI/bge-m3");
        assert_eq!(backend.endpoint(), "https://example.test/models/BAAI/bge-m3");
    }

    #[tokio::test]
    async fn missing_credential_fails_at_first_embed() {
        if hub::credential_from_env().is_some() {
            return;
        }
        let backend = RemoteBackend::new(&EmbeddingConfig::default(), None).unwrap();
        let err = backend.embed(&["xin chào".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Configuration(_)), "{err}");
    }

    #[test]
    fn flat_vector_passes_through() {
        assert_eq!(pool_response(&json!([1.0, 2.0, 3.0])).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn token_level_response_is_mean_pooled() {
        let tokens = json!([[[1.0, 0.0], [3.0, 4.0]]]);
        assert_eq!(pool_response(&tokens).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn ragged_response_is_rejected() {
        let err = pool_response(&json!([[1.0, 2.0], [1.0]])).unwrap_err();
        assert!(matches!(err, EmbedError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn error_payload_is_classified() {
        let err = pool_response(&json!({"error": "Rate limit reached"})).unwrap_err();
        assert!(err.is_transient());
        let err = pool_response(&json!([])).unwrap_err();
        assert!(matches!(err, EmbedError::Inference(_)));
    }
}
