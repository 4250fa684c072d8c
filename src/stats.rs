use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::vector::GeneVector;

pub const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Correlates two vectors over the samples they share.
///
/// Samples present in only one vector, or missing in either, are dropped. Returns `None` when
/// fewer than [`MIN_SAMPLES`] remain or either side is constant.
pub fn compare(a: &GeneVector, b: &GeneVector) -> Option<Correlation> {
    let other = b.as_map();
    let mut pairs = a
        .iter()
        .filter_map(|(sample, x)| {
            let y = other.get(sample).copied().flatten()?;
            Some((sample, x?, y))
        })
        .filter(|(_, x, y)| x.is_finite() && y.is_finite())
        .collect::<Vec<_>>();
    // Fixed summation order keeps compare(a, b) and compare(b, a) bit-identical.
    pairs.sort_by(|left, right| left.0.cmp(right.0));

    let xs = pairs.iter().map(|(_, x, _)| *x).collect::<Vec<_>>();
    let ys = pairs.iter().map(|(_, _, y)| *y).collect::<Vec<_>>();
    pearson(&xs, &ys)
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<Correlation> {
    let n = xs.len();
    if n != ys.len() || n < MIN_SAMPLES || is_constant(xs) || is_constant(ys) {
        return None;
    }

    let nf = n as f64;
    let mean_x = xs.iter().sum::<f64>() / nf;
    let mean_y = ys.iter().sum::<f64>() / nf;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }

    let r = (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0);
    if !r.is_finite() {
        return None;
    }

    let df = nf - 2.0;
    let p_value = if r.abs() >= 1.0 {
        0.0
    } else {
        let t = r * (df / (1.0 - r * r)).sqrt();
        let dist = StudentsT::new(0.0, 1.0, df).ok()?;
        (2.0 * dist.cdf(-t.abs())).clamp(0.0, 1.0)
    };

    Some(Correlation { r, p_value, n })
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] == pair[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(name: &str, values: &[(&str, Option<f64>)]) -> GeneVector {
        GeneVector::new(
            name,
            values.iter().map(|(s, _)| s.to_string()).collect(),
            values.iter().map(|(_, v)| *v).collect(),
        )
    }

    #[test]
    fn perfect_positive_correlation() {
        let a = vector("a", &[("s1", Some(1.0)), ("s2", Some(2.0)), ("s3", Some(3.0))]);
        let b = vector("b", &[("s3", Some(30.0)), ("s1", Some(10.0)), ("s2", Some(20.0))]);
        let result = compare(&a, &b).unwrap();
        assert!((result.r - 1.0).abs() < 1e-12);
        assert_eq!(result.p_value, 0.0);
        assert_eq!(result.n, 3);
    }

    #[test]
    fn known_p_value() {
        // scipy.stats.pearsonr([1, 2, 3, 4, 5], [2, 1, 4, 3, 5]) -> r = 0.8, p ~ 0.1041
        let r = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 3.0, 5.0]).unwrap();
        assert!((r.r - 0.8).abs() < 1e-12);
        assert!((r.p_value - 0.1041).abs() < 1e-3);
    }

    #[test]
    fn too_few_aligned_samples() {
        let a = vector("a", &[("s1", Some(1.0)), ("s2", Some(2.0)), ("s3", None)]);
        let b = vector("b", &[("s1", Some(1.0)), ("s2", Some(5.0)), ("s3", Some(3.0))]);
        assert_eq!(compare(&a, &b), None);
    }

    #[test]
    fn constant_vector_is_rejected() {
        let a = vector("a", &[("s1", Some(1.0)), ("s2", Some(1.0)), ("s3", Some(1.0))]);
        let b = vector("b", &[("s1", Some(1.0)), ("s2", Some(5.0)), ("s3", Some(3.0))]);
        assert_eq!(compare(&a, &b), None);
    }

    #[test]
    fn swapping_inputs_keeps_result() {
        let a = vector(
            "a",
            &[("s1", Some(0.3)), ("s2", Some(1.7)), ("s3", Some(2.2)), ("s4", Some(0.9))],
        );
        let b = vector(
            "b",
            &[("s4", Some(4.1)), ("s2", Some(0.4)), ("s1", Some(3.3)), ("s3", Some(1.0))],
        );
        assert_eq!(compare(&a, &b), compare(&b, &a));
    }
}
