//! Vector distance metrics (§4.7).

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    NegatedDot,
}

impl DistanceMetric {
    /// Distance used internally by the graph's min-heaps (smaller = closer).
    pub fn distance(self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::NegatedDot => negated_dot(a, b),
        }
    }

    /// Monotonic mapping from internal distance back to a user-facing
    /// similarity score: `1 - d` for cosine, `exp(-d)` for Euclidean,
    /// `-d` for dot.
    pub fn score(self, distance: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::Euclidean => (-distance).exp(),
            DistanceMetric::NegatedDot => -distance,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
}

fn norm(a: &[f32]) -> f64 {
    dot(a, a).sqrt()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot(a, b) / (na * nb)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn negated_dot(a: &[f32], b: &[f32]) -> f64 {
    -dot(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_identical_vectors_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-9);
    }

    #[test]
    fn cosine_distance_zero_vector_is_max() {
        let zero = vec![0.0, 0.0];
        let v = vec![1.0, 1.0];
        assert_eq!(cosine_distance(&zero, &v), 1.0);
    }

    #[test]
    fn euclidean_distance_nonnegative_and_symmetric() {
        let a = vec![1.0, 2.0];
        let b = vec![4.0, 6.0];
        let d1 = euclidean_distance(&a, &b);
        let d2 = euclidean_distance(&b, &a);
        assert!((d1 - d2).abs() < 1e-9);
        assert!(d1 >= 0.0);
    }

    #[test]
    fn score_mappings_are_monotonic_in_distance() {
        assert!(DistanceMetric::Cosine.score(0.1) > DistanceMetric::Cosine.score(0.5));
        assert!(DistanceMetric::Euclidean.score(0.1) > DistanceMetric::Euclidean.score(0.5));
        assert!(DistanceMetric::NegatedDot.score(0.1) > DistanceMetric::NegatedDot.score(0.5));
    }
}
