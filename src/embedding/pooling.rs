//! Mean pooling over token embeddings and L2 normalization.

use ndarray::{Array2, Array3, ArrayView2, Axis};

use super::error::{EmbedError, EmbedResult};

/// Lower bound on the number of attended tokens, so an all-padding row
/// divides by a tiny constant instead of zero.
const MASK_FLOOR: f32 = 1e-9;

/// Token-level model output, in whatever precision the graph produced.
#[derive(Debug, Clone)]
pub enum TokenEmbeddings {
    F32(Array3<f32>),
    F16(Array3<half::f16>),
    BF16(Array3<half::bf16>),
}

impl TokenEmbeddings {
    /// Widen to `f32`. Reduced-precision floats never leave the provider.
    pub fn into_f32(self) -> Array3<f32> {
        match self {
            Self::F32(a) => a,
            Self::F16(a) => a.mapv(f32::from),
            Self::BF16(a) => a.mapv(f32::from),
        }
    }

    /// `(batch, seq_len, hidden)`
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::F32(a) => a.dim(),
            Self::F16(a) => a.dim(),
            Self::BF16(a) => a.dim(),
        }
    }
}

/// Average each row's token vectors over positions where the attention mask is
/// set. Output shape is `(batch, hidden)`.
pub fn mean_pool(
    token_embeddings: &Array3<f32>,
    attention_mask: ArrayView2<'_, i64>,
) -> EmbedResult<Array2<f32>> {
    let (batch, seq_len, _) = token_embeddings.dim();
    if attention_mask.dim() != (batch, seq_len) {
        return Err(EmbedError::Inference(format!(
            "attention mask shape {:?} does not match token embeddings ({batch}, {seq_len}, _)",
            attention_mask.dim()
        )));
    }

    let mask = attention_mask.mapv(|m| m as f32).insert_axis(Axis(2));
    let summed = (token_embeddings * &mask).sum_axis(Axis(1));
    let counts = mask.sum_axis(Axis(1)).mapv(|c| c.max(MASK_FLOOR));
    Ok(summed / &counts)
}

/// Scale every row to unit length. Zero rows are left as zeros; only a row
/// with no attended tokens pools to zero, and the provider rejects those.
pub fn l2_normalize_rows(mut vectors: Array2<f32>) -> Array2<f32> {
    for mut row in vectors.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
    vectors
}

/// Whether `v` has length 1 within `f32` rounding.
pub fn is_unit_norm(v: &[f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() < 1e-3
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
