//! Semantic embedding generation contract and similarity scoring.

pub mod provider;
pub mod similarity;

pub use provider::EmbeddingProvider;
pub use similarity::{cosine_similarity, summary_embedding};
