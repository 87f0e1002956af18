//! Random test matrices.

use splu_core::linalg::sparse::{self, SparseCsc};

/// Random `n x n` matrix with off-diagonal density `density` and a
/// diagonal that dominates each row, so it is nonsingular.
pub fn diagonally_dominant(n: usize, density: f64, seed: u64) -> SparseCsc {
    // Simple LCG random number generator
    let mut rng_state = seed;
    let mut rand = || -> f64 {
        rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((rng_state >> 33) as f64) / (u32::MAX as f64)
    };

    let mut triplets = Vec::new();
    let mut row_sums = vec![0.0; n];
    for j in 0..n {
        for (i, sum) in row_sums.iter_mut().enumerate() {
            if i != j && rand() < density {
                let val = 2.0 * rand() - 1.0; // Random in [-1, 1]
                *sum += val.abs();
                triplets.push((i, j, val));
            }
        }
    }
    for (i, sum) in row_sums.iter().enumerate() {
        // Random sign keeps the matrix unsymmetric in value as well as pattern.
        let sign = if rand() < 0.5 { -1.0 } else { 1.0 };
        triplets.push((i, i, sign * (sum + 1.0 + rand())));
    }

    sparse::from_triplets(n, n, triplets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_for_seed() {
        let a = diagonally_dominant(30, 0.1, 12345);
        let b = diagonally_dominant(30, 0.1, 12345);
        assert_eq!(a, b);
        assert_ne!(a, diagonally_dominant(30, 0.1, 54321));
    }

    #[test]
    fn test_rows_are_dominant() {
        let a = diagonally_dominant(40, 0.2, 7);
        let mut off = vec![0.0; 40];
        let mut diag = vec![0.0; 40];
        for (&v, (i, j)) in a.iter() {
            if i == j {
                diag[i] = v;
            } else {
                off[i] += v.abs();
            }
        }
        for i in 0..40 {
            assert!(diag[i].abs() > off[i]);
        }
    }
}
