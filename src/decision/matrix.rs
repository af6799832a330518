//! Row-major dense linear algebra for the LinUCB posterior: Cholesky
//! decomposition, a rank-1 Cholesky update via Givens rotations, and
//! triangular solves. All matrices here are `d*d` flattened `Vec<f64>` in
//! row-major order.

pub const EPSILON: f64 = 1e-9;
pub const MIN_RANK1_DIAG: f64 = 1e-9;

/// Full Cholesky decomposition of a (supposedly) positive-definite `a` into
/// lower-triangular `L` such that `A = L*L^T`. `lambda` floors the diagonal
/// regularization so a degenerate `A` still yields a usable factor rather
/// than NaNs.
pub fn cholesky_decompose(a: &[f64], d: usize, lambda: f64) -> Vec<f64> {
    let safe_lambda = lambda.max(0.001);
    let mut l = vec![0.0; d * d];

    for i in 0..d {
        for j in 0..=i {
            let mut sum = a[i * d + j];
            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }

            if i == j {
                if sum <= 0.0 {
                    l[i * d + i] = safe_lambda.sqrt();
                } else {
                    l[i * d + i] = sum.sqrt().max(EPSILON);
                }
            } else {
                let diag = l[j * d + j];
                l[i * d + j] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
            }
        }
    }

    l
}

/// Rank-1 update of `L` in place so that `L_new*L_new^T = L*L^T + x*x^T`,
/// via sequential Givens rotations. Returns `false` (leaving `l` untouched
/// in spirit, though partially overwritten) when the update would drive a
/// diagonal entry below `min_diag` or non-finite — callers must then fall
/// back to a full `cholesky_decompose` from the rebuilt `A`.
pub fn cholesky_rank1_update(l: &mut [f64], x: &[f64], d: usize, min_diag: f64) -> bool {
    let safe_min_diag = min_diag.max(MIN_RANK1_DIAG);
    let mut x_work = x.to_vec();

    for k in 0..d {
        let l_kk = l[k * d + k];
        let x_k = x_work[k];
        let r = (l_kk * l_kk + x_k * x_k).sqrt();

        if !r.is_finite() || r < safe_min_diag {
            return false;
        }

        let c = l_kk / r;
        let s = x_k / r;
        l[k * d + k] = r;

        for i in (k + 1)..d {
            let l_ik = l[i * d + k];
            let x_i = x_work[i];
            l[i * d + k] = c * l_ik + s * x_i;
            x_work[i] = -s * l_ik + c * x_i;
        }
    }

    l.iter().all(|v| v.is_finite())
        && (0..d).all(|i| l[i * d + i] >= safe_min_diag || l[i * d + i].is_finite())
}

/// Solve `L*y = b` by forward substitution.
pub fn solve_triangular_lower(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * x[j];
        }
        let diag = l[i * n + i];
        x[i] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
    }
    x
}

/// Solve `L^T*x = b` by back substitution.
fn solve_triangular_upper_transpose(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        let diag = l[i * n + i];
        x[i] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
    }
    x
}

/// Solve `A*x = b` given `A = L*L^T` via two triangular solves.
pub fn solve_cholesky(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let y = solve_triangular_lower(l, b, d);
    solve_triangular_upper_transpose(l, &y, d)
}

/// `x^T * A^{-1} * x = ||L^{-1}*x||^2`, the UCB exploration term.
pub fn compute_quadratic_form(l: &[f64], x: &[f64], d: usize) -> f64 {
    let z = solve_triangular_lower(l, x, d);
    z.iter().map(|v| v * v).sum()
}

pub fn mat_vec_mul(a: &[f64], x: &[f64], d: usize) -> Vec<f64> {
    let mut result = vec![0.0; d];
    for i in 0..d {
        for j in 0..d {
            result[i] += a[i * d + j] * x[j];
        }
    }
    result
}

pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `A += x*x^T`.
pub fn rank1_update_matrix(a: &mut [f64], x: &[f64], d: usize) {
    for i in 0..d {
        for j in 0..d {
            a[i * d + j] += x[i] * x[j];
        }
    }
}

pub fn vec_add_scaled(a: &mut [f64], b: &[f64], scale: f64) {
    for (ai, bi) in a.iter_mut().zip(b.iter()) {
        *ai += scale * bi;
    }
}

/// `A` symmetric and positive-definite up to Frobenius tolerance, recovered
/// from `L` for property-testing (P2: `A = L^T*L`).
pub fn reconstruct_from_cholesky(l: &[f64], d: usize) -> Vec<f64> {
    let mut a = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..d {
            let mut sum = 0.0;
            for k in 0..d.min(i + 1).min(j + 1) {
                sum += l[i * d + k] * l[j * d + k];
            }
            a[i * d + j] = sum;
        }
    }
    a
}

pub fn frobenius_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cholesky_of_lambda_identity_is_sqrt_lambda_identity() {
        let d = 4;
        let lambda = 2.0;
        let mut a = vec![0.0; d * d];
        for i in 0..d {
            a[i * d + i] = lambda;
        }
        let l = cholesky_decompose(&a, d, lambda);
        for i in 0..d {
            assert!((l[i * d + i] - lambda.sqrt()).abs() < 1e-9);
            for j in 0..d {
                if i != j {
                    assert!(l[i * d + j].abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn solve_cholesky_matches_direct_solve() {
        let d = 2;
        let a = vec![2.0, 1.0, 1.0, 2.0];
        let b = vec![1.0, 2.0];
        let l = cholesky_decompose(&a, d, 0.001);
        let x = solve_cholesky(&l, &b, d);
        let ax = mat_vec_mul(&a, &x, d);
        for i in 0..d {
            assert!((ax[i] - b[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn rank1_update_matches_full_recompute() {
        let d = 3;
        let lambda = 1.0;
        let mut a = vec![0.0; d * d];
        for i in 0..d {
            a[i * d + i] = lambda;
        }
        let mut l = cholesky_decompose(&a, d, lambda);
        let x = vec![0.3, -0.2, 0.7];

        rank1_update_matrix(&mut a, &x, d);
        let updated = cholesky_rank1_update(&mut l, &x, d, 1e-9);
        assert!(updated);

        let recomputed = cholesky_decompose(&a, d, lambda);
        let reconstructed_from_update = reconstruct_from_cholesky(&l, d);
        let reconstructed_from_recompute = reconstruct_from_cholesky(&recomputed, d);
        assert!(
            frobenius_diff(&reconstructed_from_update, &reconstructed_from_recompute) < 1e-6
        );
        assert!(frobenius_diff(&reconstructed_from_update, &a) < 1e-6);
    }

    #[test]
    fn quadratic_form_with_identity_is_squared_norm() {
        let d = 2;
        let l = vec![1.0, 0.0, 0.0, 1.0];
        let x = vec![3.0, 4.0];
        assert!((compute_quadratic_form(&l, &x, d) - 25.0).abs() < 1e-9);
    }
}
