//! Cosine similarity and the quartile-chunk "summary embedding" used for
//! near-tie disambiguation.

use crate::types::Embedding;

/// Cosine similarity between two embeddings.
///
/// Both inputs are expected to already be L2-normalized (the contract every
/// [`crate::embeddings::EmbeddingProvider`] must uphold), so this reduces to
/// a plain dot product; the denominator is still computed defensively in
/// case a caller hands in an unnormalized vector (e.g. a freshly averaged
/// summary embedding before renormalization).
///
/// # Examples
///
/// ```
/// use epimatch_core::embeddings::cosine_similarity;
/// use epimatch_core::types::Embedding;
///
/// let a = Embedding::new(vec![1.0; 384]).unwrap();
/// let b = a.clone();
/// assert!((epimatch_core::embeddings::cosine_similarity(&a, &b) - 1.0).abs() < 1e-4);
/// ```
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f64 {
    let a = a.as_slice();
    let b = b.as_slice();
    debug_assert_eq!(a.len(), b.len());

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Split `text` into four contiguous character-count quartiles, the last
/// absorbing any remainder.
#[must_use]
pub fn split_into_quartiles(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new(); 4];
    }
    let quartile_len = chars.len() / 4;
    let mut chunks = Vec::with_capacity(4);
    let mut start = 0;
    for i in 0..4 {
        let end = if i == 3 { chars.len() } else { start + quartile_len };
        chunks.push(chars[start..end].iter().collect());
        start = end;
    }
    chunks
}

/// Mean-pool `n` equal-dimension embeddings into one vector, then
/// renormalize to unit length. The spec calls this the "summary embedding":
/// the mean of four quartile-chunk embeddings of the same text.
///
/// # Panics
///
/// Panics if `embeddings` is empty; callers always pass exactly four
/// quartile embeddings.
#[must_use]
pub fn mean_and_normalize(embeddings: &[Embedding]) -> Embedding {
    assert!(!embeddings.is_empty(), "mean_and_normalize requires at least one embedding");
    let dim = embeddings[0].as_slice().len();
    let mut sums = vec![0.0f32; dim];
    for emb in embeddings {
        for (sum, value) in sums.iter_mut().zip(emb.as_slice()) {
            *sum += value;
        }
    }
    let count = embeddings.len() as f32;
    for sum in &mut sums {
        *sum /= count;
    }
    let norm: f32 = sums.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut sums {
            *v /= norm;
        }
    }
    Embedding::new(sums).expect("dimension preserved by construction")
}

/// Produce the summary embedding for `text` by splitting it into four
/// quartiles, embedding each with `embed`, and mean-pooling the results.
///
/// `embed` is an async closure over the embedding collaborator so this
/// helper stays agnostic of any concrete provider.
///
/// # Errors
///
/// Propagates the first embedding failure from `embed`.
pub async fn summary_embedding<F, Fut>(text: &str, mut embed: F) -> crate::error::Result<Embedding>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<Embedding>>,
{
    let quartiles = split_into_quartiles(text);
    let mut parts = Vec::with_capacity(4);
    for chunk in quartiles {
        parts.push(embed(chunk).await?);
    }
    Ok(mean_and_normalize(&parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::test_support::deterministic_embedding;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let a = Embedding::new(vec![0.5; 384]).unwrap();
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let mut va = vec![0.0f32; 384];
        va[0] = 1.0;
        let mut vb = vec![0.0f32; 384];
        vb[1] = 1.0;
        let a = Embedding::new(va).unwrap();
        let b = Embedding::new(vb).unwrap();
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn quartile_split_covers_full_text_without_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = split_into_quartiles(text);
        assert_eq!(chunks.len(), 4);
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn quartile_split_handles_empty_text() {
        let chunks = split_into_quartiles("");
        assert_eq!(chunks, vec!["", "", "", ""]);
    }

    #[test]
    fn mean_and_normalize_produces_unit_vector() {
        let embeddings = vec![
            deterministic_embedding("chunk one"),
            deterministic_embedding("chunk two"),
            deterministic_embedding("chunk three"),
            deterministic_embedding("chunk four"),
        ];
        let summary = mean_and_normalize(&embeddings);
        assert!((summary.norm() - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn summary_embedding_calls_embed_four_times() {
        let mut calls = 0;
        let text = "one two three four five six seven eight nine ten";
        let summary = summary_embedding(text, |chunk| {
            calls += 1;
            async move { Ok(deterministic_embedding(&chunk)) }
        })
        .await
        .unwrap();
        assert_eq!(calls, 4);
        assert!((summary.norm() - 1.0).abs() < 1e-4);
    }
}
