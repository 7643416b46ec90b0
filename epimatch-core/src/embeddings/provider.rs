//! The embedding provider contract.
//!
//! The concrete embedding model (in production, an ONNX sentence-embedding
//! model) is deliberately out of scope for this crate per §1/§6: it is an
//! external collaborator reached through this trait. Implementations live
//! in the CLI binary or a storage backend crate, never here.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Embedding;

/// Produces fixed-dimension, L2-normalized semantic embeddings from text.
///
/// # Errors
///
/// Implementations return `Err` when the underlying model fails to run;
/// callers (the identification engine) treat that as a recoverable
/// condition that falls back to other strategies rather than a hard
/// failure.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding for `text`.
    async fn generate(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for a batch of texts, preserving input order.
    ///
    /// The default implementation calls [`EmbeddingProvider::generate`]
    /// sequentially; providers with native batching should override this
    /// for throughput.
    async fn batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.generate(text).await?);
        }
        Ok(out)
    }
}

/// Deterministic test doubles for [`EmbeddingProvider`], shared by this
/// crate's own tests and, behind the `test-support` feature, by other
/// workspace crates' test suites.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A deterministic, hash-based stand-in for a real embedding model,
    /// used only in tests.
    #[derive(Default)]
    pub struct DeterministicProvider {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for DeterministicProvider {
        async fn generate(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(deterministic_embedding(text))
        }
    }

    /// Hash `text` into a deterministic unit vector. Not semantically
    /// meaningful; only used to exercise similarity-search code paths
    /// without pulling in a real model.
    #[must_use]
    pub fn deterministic_embedding(text: &str) -> Embedding {
        use crate::types::EMBEDDING_DIM;
        let mut state: u64 = 1469598103934665603;
        for b in text.bytes() {
            state ^= u64::from(b);
            state = state.wrapping_mul(1099511628211);
        }
        let mut values = Vec::with_capacity(EMBEDDING_DIM);
        let mut s = state;
        for _ in 0..EMBEDDING_DIM {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let v = ((s >> 33) as f64 / u32::MAX as f64) * 2.0 - 1.0;
            values.push(v as f32);
        }
        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        Embedding::new(values).expect("fixed-size vector")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn batch_default_impl_preserves_order_and_uses_generate() {
        let provider = DeterministicProvider::default();
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let embeddings = provider.batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 3);
        for (text, embedding) in texts.iter().zip(embeddings.iter()) {
            let direct = provider.generate(text).await.unwrap();
            assert_eq!(direct.as_slice(), embedding.as_slice());
        }
    }

    #[test]
    fn deterministic_embedding_is_normalized() {
        let emb = deterministic_embedding("hello world");
        assert!((emb.norm() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn deterministic_embedding_is_deterministic() {
        assert_eq!(
            deterministic_embedding("same input").as_slice(),
            deterministic_embedding("same input").as_slice()
        );
    }
}
