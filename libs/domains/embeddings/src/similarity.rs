//! Vector math and the pgvector text format.

use crate::error::{EmbeddingError, EmbeddingResult};

/// Cosine similarity in [-1, 1]. Zero-magnitude inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> EmbeddingResult<f64> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Encodes `[a,b,...]`, the input format of the `vector` type.
pub fn vector_to_literal(vector: &[f32]) -> String {
    let mut literal = String::with_capacity(vector.len() * 10 + 2);
    literal.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        literal.push_str(&value.to_string());
    }
    literal.push(']');
    literal
}

/// Parses the `vector` type's text output.
pub fn parse_vector_literal(literal: &str) -> EmbeddingResult<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| EmbeddingError::Internal(format!("Malformed vector literal: {}", literal)))?;

    if inner.trim().is_empty() {
        return Ok(vec![]);
    }

    inner
        .split(',')
        .map(|part| {
            part.trim().parse::<f32>().map_err(|e| {
                EmbeddingError::Internal(format!("Malformed vector component {:?}: {}", part, e))
            })
        })
        .collect()
}
