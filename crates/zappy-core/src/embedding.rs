//! Packed little-endian float32 embedding codec, shared by the skill
//! registry, perception layer, and memory store so every subsystem's
//! `embeddings`/`embedding` BLOB column means the same bytes (§3, §8).

/// Packs a vector of `f32`s into little-endian bytes, 4 per component.
#[must_use]
pub fn pack_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpacks little-endian bytes back into a vector of `f32`s. Any trailing
/// bytes that do not form a complete `f32` are dropped.
#[must_use]
pub fn unpack_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two equal-length vectors; `0.0` if either is
/// the zero vector or the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let vector = vec![1.0_f32, -2.5, 0.0, 3.333];
        let packed = pack_embedding(&vector);
        assert_eq!(packed.len(), vector.len() * 4);
        let unpacked = unpack_embedding(&packed);
        assert_eq!(unpacked, vector);
    }

    #[test]
    fn self_similarity_is_one() {
        let vector = vec![0.3_f32, 0.7, -0.2, 1.1];
        let packed = pack_embedding(&vector);
        let round_tripped = unpack_embedding(&packed);
        let similarity = cosine_similarity(&vector, &round_tripped);
        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_zero_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }
}
