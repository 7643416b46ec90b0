//! TextRank sentence extraction: an optional pre-embedding reduction that
//! picks the most representative sentences of a text via damped PageRank
//! over a sentence similarity graph.

use std::collections::HashMap;

const DAMPING: f64 = 0.85;
const CONVERGENCE: f64 = 1e-4;
const MAX_ITERATIONS: usize = 100;
const EDGE_WEIGHT_FLOOR: f64 = 0.1;
const MIN_TOKEN_LEN: usize = 3;

/// Split `text` into sentence-like spans on `.`, `!`, `?` boundaries,
/// trimming surrounding whitespace and discarding empties.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let candidate = text[start..=i].trim();
            if !candidate.is_empty() {
                sentences.push(candidate);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn tokenize(sentence: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for word in sentence.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < MIN_TOKEN_LEN {
            continue;
        }
        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

fn cosine_bow(a: &HashMap<String, u32>, b: &HashMap<String, u32>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    for (term, count_a) in a {
        if let Some(count_b) = b.get(term) {
            dot += f64::from(*count_a) * f64::from(*count_b);
        }
    }
    let norm_a: f64 = a.values().map(|c| f64::from(*c).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|c| f64::from(*c).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Run damped PageRank over an edge-weight matrix until scores converge or
/// the iteration cap is hit.
fn page_rank(edges: &[Vec<f64>]) -> Vec<f64> {
    let n = edges.len();
    if n == 0 {
        return Vec::new();
    }
    let out_weight: Vec<f64> = edges.iter().map(|row| row.iter().sum()).collect();
    let mut scores = vec![1.0 / n as f64; n];

    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![(1.0 - DAMPING) / n as f64; n];
        for (j, next_j) in next.iter_mut().enumerate() {
            let mut incoming = 0.0;
            for (i, row) in edges.iter().enumerate() {
                if i == j || row[j] <= 0.0 || out_weight[i] <= 0.0 {
                    continue;
                }
                incoming += row[j] / out_weight[i] * scores[i];
            }
            *next_j += DAMPING * incoming;
        }
        let delta: f64 = scores
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        scores = next;
        if delta < CONVERGENCE {
            break;
        }
    }
    scores
}

/// Reduce `text` to its top-scoring sentences by TextRank, falling back to
/// the full text on any of the conditions below.
///
/// Falls back to the unmodified input when: the input is empty, it has
/// fewer than `min_sentences` sentences, or the requested `percentage`
/// would select fewer than `min_percentage` of the sentences present.
/// Selected sentences are re-emitted in their original chronological order.
///
/// # Examples
///
/// ```
/// use epimatch_core::text::textrank::reduce_to_top_sentences;
///
/// let text = "A cat sat on the mat. The mat was red. Dogs like bones. Cats like mats.";
/// let reduced = reduce_to_top_sentences(text, 50.0, 2, 10.0);
/// assert!(!reduced.is_empty());
/// ```
#[must_use]
pub fn reduce_to_top_sentences(
    text: &str,
    percentage: f64,
    min_sentences: usize,
    min_percentage: f64,
) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let sentences = split_sentences(text);
    if sentences.len() < min_sentences {
        return text.to_string();
    }

    let keep_count = ((sentences.len() as f64 * percentage / 100.0).ceil() as usize).max(1);
    let actual_percentage = keep_count as f64 / sentences.len() as f64 * 100.0;
    if actual_percentage < min_percentage {
        return text.to_string();
    }

    let bags: Vec<HashMap<String, u32>> = sentences.iter().map(|s| tokenize(s)).collect();
    let n = sentences.len();
    let mut edges = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let weight = cosine_bow(&bags[i], &bags[j]);
            if weight >= EDGE_WEIGHT_FLOOR {
                edges[i][j] = weight;
                edges[j][i] = weight;
            }
        }
    }

    let scores = page_rank(&edges);
    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected: Vec<usize> = ranked.into_iter().take(keep_count).collect();
    selected.sort_unstable();

    selected
        .into_iter()
        .map(|i| sentences[i])
        .collect::<Vec<_>>()
        .join(" ")
}
