use ndarray::{Array2, ArrayView2, ArrayViewMut2, Zip};

use super::linalg::{Cholesky, condition_diagonal, coordinate_descent};
use crate::{DictErr, DictFactConfig, Result};

/// Sweep budget of the coordinate descent path.
const MAX_SWEEPS: usize = 1000;

/// Computes elastic-net codes from a gram matrix and per-sample correlations.
///
/// Ridge codes (`pen_l1_ratio == 0`) go through a single Cholesky factorization shared by the
/// whole batch, any L1 share switches to coordinate descent.
#[derive(Debug, Clone, Copy)]
pub struct CodeSolver {
    pub alpha: f64,
    pub pen_l1_ratio: f64,
    pub tol: f64,
    pub max_iter: usize,
}

impl CodeSolver {
    pub fn new(alpha: f64, pen_l1_ratio: f64, tol: f64) -> Self {
        Self {
            alpha,
            pen_l1_ratio,
            tol,
            max_iter: MAX_SWEEPS,
        }
    }

    pub fn from_config(config: &DictFactConfig) -> Self {
        Self::new(config.alpha, config.pen_l1_ratio, config.tol)
    }

    /// Solves one code per row of `dx`, rows are solved in parallel.
    ///
    /// # Arguments
    /// * `gram` - The `n_components x n_components` gram matrix shared by the batch.
    /// * `dx` - The `len_batch x n_components` correlations.
    /// * `code` - Where the `len_batch x n_components` codes are written.
    ///
    /// # Returns
    /// A `NotPositiveDefinite` error if the gram matrix is invalid or a `NonFinite` error if a
    /// code blew up.
    pub fn solve(
        &self,
        gram: &Array2<f64>,
        dx: ArrayView2<f64>,
        mut code: ArrayViewMut2<f64>,
    ) -> Result<()> {
        let mut gram = gram.clone();
        condition_diagonal(&mut gram)?;

        if self.pen_l1_ratio == 0. {
            let cholesky = Cholesky::factor(&gram, self.alpha)?;
            code.assign(&dx);

            Zip::from(code.rows_mut()).par_for_each(|row| cholesky.solve_inplace(row));
        } else {
            let a_l1 = self.alpha * self.pen_l1_ratio;
            let a_l2 = self.alpha * (1. - self.pen_l1_ratio);

            code.fill(0.);
            Zip::from(code.rows_mut())
                .and(dx.rows())
                .par_for_each(|row, dx| {
                    coordinate_descent(
                        gram.view(),
                        dx,
                        row,
                        a_l1,
                        a_l2,
                        self.tol,
                        self.max_iter,
                    );
                });
        }

        if code.iter().any(|c| !c.is_finite()) {
            return Err(DictErr::NonFinite("code"));
        }

        Ok(())
    }

    /// The penalty of a batch of codes, summed over rows.
    pub fn penalty(&self, code: ArrayView2<f64>) -> f64 {
        let (l1, l2) = code
            .iter()
            .fold((0., 0.), |(l1, l2), c| (l1 + c.abs(), l2 + c * c));

        self.alpha * (self.pen_l1_ratio * l1 + 0.5 * (1. - self.pen_l1_ratio) * l2)
    }
}
