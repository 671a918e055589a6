//! Dense vector helpers shared by the builder, store and matcher.

/// L2 norm, accumulated in f64.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt() as f32
}

/// Normalize in place. Returns the original norm, or `None` when the vector is
/// non-finite or its norm is not above `min_norm` (the vector is left untouched).
pub fn normalize_in_place(v: &mut [f32], min_norm: f32) -> Option<f32> {
    if v.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let norm = l2_norm(v);
    if !norm.is_finite() || norm <= min_norm {
        return None;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Some(norm)
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

/// Little-endian packing of row-major vectors.
pub fn f32s_to_le_bytes(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Inverse of [`f32s_to_le_bytes`]. Trailing bytes that do not form a full f32 are ignored.
pub fn f32s_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_in_place() {
        let mut v = vec![3.0, 4.0];
        let norm = normalize_in_place(&mut v, 1e-12).unwrap();
        assert!((norm - 5.0).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rejects_zero_and_nan() {
        let mut zero = vec![0.0; 8];
        assert!(normalize_in_place(&mut zero, 1e-12).is_none());

        let mut nan = vec![1.0, f32::NAN];
        assert!(normalize_in_place(&mut nan, 1e-12).is_none());
    }

    #[test]
    fn test_dot() {
        assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }

    #[test]
    fn test_le_bytes_layout() {
        let bytes = f32s_to_le_bytes(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(f32s_from_le_bytes(&bytes), vec![1.0, -2.5]);
    }
}
