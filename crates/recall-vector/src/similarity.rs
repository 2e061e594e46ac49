//! Cosine similarity.
//!
//! Accumulates in f64 regardless of the f32 storage type, then rounds.

use crate::error::VectorError;

/// Decimal digits kept when no precision is configured.
pub const DEFAULT_PRECISION: u32 = 6;

/// Cosine similarity of `a` and `b`, rounded to `precision` decimal digits.
///
/// Returns 0 when either vector has zero magnitude, including two zero vectors.
/// Fails with [`VectorError::LengthMismatch`] when lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32], precision: u32) -> Result<f64, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Ok(round_to(similarity, precision))
}

/// Decimal digits an f64 can still resolve. Larger precisions leave scores unrounded.
pub const MAX_PRECISION: u32 = 15;

/// Round to `precision` decimal digits.
pub fn round_to(value: f64, precision: u32) -> f64 {
    if precision > MAX_PRECISION {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = [0.3, -1.2, 4.5, 0.0];
        assert_eq!(cosine_similarity(&a, &a, DEFAULT_PRECISION).unwrap(), 1.0);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0], DEFAULT_PRECISION).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0], DEFAULT_PRECISION).unwrap();
        assert_eq!(sim, -1.0);
    }

    #[test]
    fn test_cosine_similarity_diagonal_rounded() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0], DEFAULT_PRECISION).unwrap();
        assert_eq!(sim, 0.707107);

        let coarse = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0], 2).unwrap();
        assert_eq!(coarse, 0.71);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        for precision in [0, 2, 6, 10] {
            assert_eq!(
                cosine_similarity(&[0.0, 0.0], &[1.0, 0.0], precision).unwrap(),
                0.0
            );
            assert_eq!(
                cosine_similarity(&[0.0, 0.0], &[0.0, 0.0], precision).unwrap(),
                0.0
            );
        }
    }

    #[test]
    fn test_cosine_similarity_different_dimensions() {
        let result = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0], DEFAULT_PRECISION);
        assert!(matches!(
            result,
            Err(VectorError::LengthMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert_eq!(cosine_similarity(&a, &b, DEFAULT_PRECISION).unwrap(), 1.0);
    }

    #[test]
    fn test_self_similarity_random_vectors() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..50 {
            let dim = rng.random_range(1..64);
            let v: Vec<f32> = (0..dim).map(|_| rng.random_range(-10.0..10.0)).collect();
            if v.iter().all(|x| *x == 0.0) {
                continue;
            }
            assert_eq!(cosine_similarity(&v, &v, DEFAULT_PRECISION).unwrap(), 1.0);
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456789, 3), 0.123);
        assert_eq!(round_to(-0.98765, 2), -0.99);
        assert_eq!(round_to(0.5, 0), 1.0);
    }

    #[test]
    fn test_large_precision_keeps_scores_in_range() {
        for precision in [MAX_PRECISION + 1, 400, u32::MAX] {
            let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0], precision).unwrap();
            assert!((-1.0..=1.0).contains(&sim), "precision {} gave {}", precision, sim);
            assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        }
        assert_eq!(round_to(0.123456789, 400), 0.123456789);
    }
}
