//! Text normalization and TextRank-based pre-embedding reduction.

pub mod normalize;
pub mod textrank;

pub use normalize::clean_text;
pub use textrank::reduce_to_top_sentences;
