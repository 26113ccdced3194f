use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1};

use crate::{DictErr, Result};

/// Diagonal entries at or below this are treated as zero atoms.
const ZERO_DIAGONAL: f64 = 1e-12;

/// Diagonal entries below this can't come from a gram matrix.
const NEGATIVE_DIAGONAL: f64 = -1e-10;

/// Cholesky pivots within this share of the largest shifted diagonal entry are rounding noise.
const PIVOT_RTOL: f64 = 1e-10;

/// Returns `d * d^T`, exactly symmetric.
pub fn gram_matrix(d: ArrayView2<f64>) -> Array2<f64> {
    let g = d.dot(&d.t());
    (&g + &g.t()) * 0.5
}

/// Replaces the zero diagonal entries of `g` by one so the solves stay well posed.
///
/// # Returns
/// A `NotPositiveDefinite` error if a diagonal entry is clearly negative.
pub fn condition_diagonal(g: &mut Array2<f64>) -> Result<()> {
    for (pivot, value) in g.diag_mut().iter_mut().enumerate() {
        if *value < NEGATIVE_DIAGONAL || value.is_nan() {
            return Err(DictErr::NotPositiveDefinite {
                pivot,
                value: *value,
            });
        }

        if *value <= ZERO_DIAGONAL {
            *value = 1.;
        }
    }

    Ok(())
}

/// The lower triangular Cholesky factor of a shifted symmetric matrix.
#[derive(Debug, Clone)]
pub struct Cholesky {
    l: Array2<f64>,
}

impl Cholesky {
    /// Factors `g + shift * I`.
    ///
    /// Singular positive semi-definite matrices are accepted: a pivot lost in rounding is floored
    /// to a small fraction of the largest diagonal entry, which factors a nearby definite matrix.
    ///
    /// # Arguments
    /// * `g` - A square symmetric matrix, only its lower triangle is read.
    /// * `shift` - A non negative ridge added to the diagonal.
    ///
    /// # Returns
    /// The factor or a `NotPositiveDefinite` error naming the first clearly negative pivot.
    pub fn factor(g: &Array2<f64>, shift: f64) -> Result<Self> {
        let n = g.nrows();
        let mut l = Array2::zeros((n, n));

        let scale = g.diag().iter().fold(0f64, |max, v| max.max(v.abs())) + shift.abs();
        let floor = PIVOT_RTOL * scale.max(1.);

        for j in 0..n {
            let mut pivot = g[[j, j]] + shift;
            for k in 0..j {
                pivot -= l[[j, k]] * l[[j, k]];
            }

            if pivot.is_nan() || pivot < -floor {
                return Err(DictErr::NotPositiveDefinite {
                    pivot: j,
                    value: pivot,
                });
            }
            let pivot = pivot.max(floor);

            let diag = pivot.sqrt();
            l[[j, j]] = diag;

            for i in j + 1..n {
                let mut acc = g[[i, j]];
                for k in 0..j {
                    acc -= l[[i, k]] * l[[j, k]];
                }
                l[[i, j]] = acc / diag;
            }
        }

        Ok(Self { l })
    }

    /// Overwrites `b` with the solution `x` of `(g + shift * I) x = b`.
    pub fn solve_inplace(&self, mut b: ArrayViewMut1<f64>) {
        let n = self.l.nrows();

        for i in 0..n {
            let mut acc = b[i];
            for k in 0..i {
                acc -= self.l[[i, k]] * b[k];
            }
            b[i] = acc / self.l[[i, i]];
        }

        for i in (0..n).rev() {
            let mut acc = b[i];
            for k in i + 1..n {
                acc -= self.l[[k, i]] * b[k];
            }
            b[i] = acc / self.l[[i, i]];
        }
    }
}

/// Minimizes `0.5 c^T g c - dx^T c + a_l1 |c|_1 + 0.5 a_l2 |c|_2^2` by cyclic coordinate descent.
///
/// `code` is used as the starting point and overwritten with the solution. The sweeps stop once
/// the largest coordinate move falls below `tol` times the largest coordinate.
///
/// # Arguments
/// * `g` - A symmetric matrix with a positive diagonal.
/// * `dx` - The linear term.
/// * `code` - The starting point and output.
/// * `a_l1` - The L1 penalty.
/// * `a_l2` - The L2 penalty.
/// * `tol` - The relative stopping tolerance.
/// * `max_iter` - The maximum amount of sweeps.
///
/// # Returns
/// The amount of sweeps performed.
pub fn coordinate_descent(
    g: ArrayView2<f64>,
    dx: ArrayView1<f64>,
    mut code: ArrayViewMut1<f64>,
    a_l1: f64,
    a_l2: f64,
    tol: f64,
    max_iter: usize,
) -> usize {
    let n = code.len();

    // Running value of `dx - g c`.
    let mut residual = dx.to_owned() - g.dot(&code);

    for sweep in 1..=max_iter {
        let mut max_step: f64 = 0.;
        let mut max_coef: f64 = 0.;

        for k in 0..n {
            let old = code[k];
            let g_kk = g[[k, k]];
            let rho = residual[k] + g_kk * old;

            let new = soft_threshold(rho, a_l1) / (g_kk + a_l2);
            let step = new - old;

            if step != 0. {
                code[k] = new;
                residual.scaled_add(-step, &g.column(k));
            }

            max_step = max_step.max(step.abs());
            max_coef = max_coef.max(new.abs());
        }

        if max_coef == 0. || max_step <= tol * max_coef {
            return sweep;
        }
    }

    max_iter
}

fn soft_threshold(x: f64, threshold: f64) -> f64 {
    x.signum() * (x.abs() - threshold).max(0.)
}
