//! Context-triggered piecewise hashing (CTPH) fingerprinting and similarity
//! scoring.
//!
//! A CTPH fingerprint is a sequence of small rolling-hash-derived block
//! digests. Two fingerprints of similar text share long common
//! subsequences of blocks even when the surrounding text differs, which is
//! what makes the scheme tolerant of partial edits (re-encoded subtitle
//! timing drift, minor OCR noise, trailing credits). This module fixes a
//! concrete algorithm; §9's open questions leave the exact internal scheme
//! to the implementer, so long as scores land in `[0, 100]`.

use std::fmt::Write as _;

/// Alphabet used to render rolling-hash digests, matching the classic
/// ssdeep/spamsum encoding so fingerprints remain printable and diffable.
const BASE64_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const MIN_BLOCK_SIZE: u32 = 3;
/// Target number of blocks a fingerprint should contain; the block size is
/// chosen so the input splits into roughly this many pieces.
const TARGET_BLOCK_COUNT: usize = 64;

fn rolling_hash_base(data: &[u8], block_size: u32) -> (u32, Vec<u8>) {
    let mut h: u32 = 0;
    let mut blocks = Vec::new();
    let mut block_hash: u32 = 0x28_21_53_45; // FNV-ish seed, arbitrary but stable
    let mut block_len: u32 = 0;

    for &byte in data {
        h = h.rotate_left(5).wrapping_add(u32::from(byte));
        block_hash = block_hash
            .wrapping_mul(0x0100_0193)
            .wrapping_add(u32::from(byte));
        block_len += 1;

        if h % block_size == block_size - 1 {
            blocks.push(BASE64_ALPHABET[(block_hash as usize) % BASE64_ALPHABET.len()]);
            block_hash = 0x28_21_53_45;
            block_len = 0;
        }
    }
    if block_len > 0 {
        blocks.push(BASE64_ALPHABET[(block_hash as usize) % BASE64_ALPHABET.len()]);
    }
    (h, blocks)
}

fn choose_block_size(len: usize) -> u32 {
    let mut block_size = MIN_BLOCK_SIZE;
    while (len as u32) / block_size > TARGET_BLOCK_COUNT as u32 && block_size < u32::MAX / 2 {
        block_size *= 2;
    }
    block_size
}

/// A CTPH fingerprint: `block_size:signature_at_block_size:signature_at_2x`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CtphFingerprint(String);

impl CtphFingerprint {
    /// Compute a fingerprint over `text`, normalizing to bytes first.
    ///
    /// Empty input produces an empty-signature fingerprint rather than
    /// erroring; callers that need to reject empty text do so at the
    /// identification layer (`IDENTIFICATION_FAILED`).
    #[must_use]
    pub fn compute(text: &str) -> Self {
        let data = text.as_bytes();
        if data.is_empty() {
            return Self("3::".to_string());
        }
        let block_size = choose_block_size(data.len());
        let (_, sig1) = rolling_hash_base(data, block_size);
        let (_, sig2) = rolling_hash_base(data, block_size.saturating_mul(2).max(block_size + 1));

        let mut out = String::new();
        write!(out, "{block_size}:").expect("writing to String cannot fail");
        out.push_str(&String::from_utf8_lossy(&sig1));
        out.push(':');
        out.push_str(&String::from_utf8_lossy(&sig2));
        Self(out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    fn parts(&self) -> Option<(u32, &str, &str)> {
        let mut fields = self.0.splitn(3, ':');
        let block_size: u32 = fields.next()?.parse().ok()?;
        let sig1 = fields.next()?;
        let sig2 = fields.next().unwrap_or("");
        Some((block_size, sig1, sig2))
    }
}

impl std::fmt::Display for CtphFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Longest common substring length between two byte strings via dynamic
/// programming, capped at the shorter input's length.
fn longest_common_substring(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for &ca in a {
        let mut curr = vec![0usize; b.len() + 1];
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                curr[j + 1] = prev[j] + 1;
                best = best.max(curr[j + 1]);
            }
        }
        prev = curr;
    }
    best
}

/// Score two signature strings (same block size) in `[0, 100]` by the
/// fraction of the longer signature covered by their longest common
/// substring, scaled by five as ssdeep does to reward short exact runs.
fn score_signatures(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs = longest_common_substring(a, b) as f64;
    let longer = a.len().max(b.len()) as f64;
    ((lcs * 5.0) / longer * 100.0).min(100.0)
}

/// Compare two fingerprints and return a similarity score in `[0, 100]`.
///
/// Fingerprints at different block sizes that aren't within a factor of two
/// of each other are considered unrelated (the classic ssdeep rule): CTPH
/// similarity is only meaningful when block sizes roughly line up, since
/// block size is itself a function of input length.
#[must_use]
pub fn compare(a: &CtphFingerprint, b: &CtphFingerprint) -> f64 {
    let (Some((bs_a, a1, a2)), Some((bs_b, b1, b2))) = (a.parts(), b.parts()) else {
        return 0.0;
    };

    if bs_a == bs_b {
        score_signatures(a1, b1).max(score_signatures(a2, b2))
    } else if bs_a == bs_b.saturating_mul(2) {
        score_signatures(a1, b2)
    } else if bs_b == bs_a.saturating_mul(2) {
        score_signatures(a2, b1)
    } else {
        0.0
    }
}
