use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut2, Zip};

use super::Schedule;
use crate::{Weights, solver::gram_matrix, storage::RowStore};

/// The sufficient statistics of the factorization and their counters.
///
/// `a` and `b` summarize every code seen so far, `g_average` and `dx_average` are the running
/// averages the `average` solver computes codes from.
#[derive(Debug)]
pub struct Statistics {
    a: Array2<f64>,
    b: Array2<f64>,
    g_average: Array2<f64>,
    dx_average: RowStore,
    sample_counter: Box<[AtomicU64]>,
    feature_counter: Vec<u64>,
    total_counter: u64,
}

impl Statistics {
    /// Creates a new zeroed `Statistics`.
    ///
    /// # Arguments
    /// * `n_components` - The amount of atoms.
    /// * `n_features` - The amount of features.
    /// * `n_samples` - The amount of distinct samples indexed by the stream.
    ///
    /// # Returns
    /// A new `Statistics` instance.
    pub fn new(n_components: usize, n_features: usize, n_samples: usize) -> Self {
        Self {
            a: Array2::zeros((n_components, n_components)),
            b: Array2::zeros((n_components, n_features)),
            g_average: Array2::zeros((n_components, n_components)),
            dx_average: RowStore::new(n_samples, n_components),
            sample_counter: (0..n_samples).map(|_| AtomicU64::new(0)).collect(),
            feature_counter: vec![0; n_features],
            total_counter: 0,
        }
    }

    /// Counts a new batch, one visit per row in `samples`.
    pub fn advance(&mut self, samples: &[usize]) {
        self.total_counter += samples.len() as u64;

        for &sample in samples {
            *self.sample_counter[sample].get_mut() += 1;
        }
    }

    /// Counts `len_batch` observations of every feature of `subset`.
    pub fn observe(&mut self, subset: &[usize], len_batch: usize) {
        for &j in subset {
            self.feature_counter[j] += len_batch as u64;
        }
    }

    /// Computes `g_average` with the gram matrix of the observed subset folded in, leaving the
    /// statistic untouched until `commit_gram_average`.
    ///
    /// # Arguments
    /// * `schedule` - The per-sample schedule.
    /// * `len_batch` - The size of the batch, already counted by `advance`.
    /// * `reduction` - The effective reduction of the subset.
    /// * `subset_gram` - `D_S * D_S^T` for the observed subset `S`.
    pub fn folded_gram_average(
        &self,
        schedule: &Schedule,
        len_batch: usize,
        reduction: f64,
        subset_gram: &Array2<f64>,
    ) -> Array2<f64> {
        let weight = schedule.batch_weight(self.total_counter, len_batch);

        let mut g_average = self.g_average.clone();
        g_average.zip_mut_with(subset_gram, |g, s| *g = (1. - weight) * *g + weight * reduction * s);
        g_average
    }

    pub fn commit_gram_average(&mut self, g_average: Array2<f64>) {
        self.g_average = g_average;
    }

    /// Folds fresh per-sample correlations into `dx_average`, in parallel over the batch.
    ///
    /// Each sample moves with its own rate, driven by how often it has been visited, this batch
    /// included. Two rows of the same batch carrying the same sample index are serialized by the
    /// row lock.
    ///
    /// # Arguments
    /// * `schedule` - The per-sample schedule.
    /// * `samples` - The sample index of every row of the batch.
    /// * `reduction` - The effective reduction of the subset.
    /// * `fresh` - `x_S * D_S^T` per row of the batch.
    /// * `out` - Where the averaged correlations of every row are copied.
    pub fn fold_correlations(
        &self,
        schedule: &Schedule,
        samples: &[usize],
        reduction: f64,
        fresh: ArrayView2<f64>,
        mut out: ArrayViewMut2<f64>,
    ) {
        let samples = ArrayView1::from(samples);

        Zip::from(out.rows_mut())
            .and(fresh.rows())
            .and(&samples)
            .par_for_each(|out, fresh, &sample| {
                let visits = self.sample_counter[sample].load(Ordering::Relaxed);
                let weight = schedule.rate(visits);

                self.dx_average.blend(sample, weight, reduction, fresh, out);
            });
    }

    /// Folds a batch of codes into `a` and `b`.
    ///
    /// `a` gets the full symmetric `code^T * code / len_batch` update, `b` is only updated on the
    /// observed columns, with the weights of the `weights` policy.
    ///
    /// # Arguments
    /// * `schedule` - The schedule of the code statistics.
    /// * `weights` - The policy of the column weights.
    /// * `reduction` - The effective reduction of the subset.
    /// * `subset` - The observed features.
    /// * `x_subset` - The batch restricted to `subset`.
    /// * `code` - The codes of the batch.
    pub fn update(
        &mut self,
        schedule: &Schedule,
        weights: Weights,
        reduction: f64,
        subset: &[usize],
        x_subset: ArrayView2<f64>,
        code: ArrayView2<f64>,
    ) {
        let len_batch = code.nrows();
        let scale = 1. / len_batch as f64;
        let weight = schedule.batch_weight(self.total_counter, len_batch);

        let fresh_a = gram_matrix(code.t());
        self.a
            .zip_mut_with(&fresh_a, |a, f| *a = (1. - weight) * *a + weight * scale * f);

        let column_weights = weights.column_weights(
            schedule,
            weight,
            reduction,
            subset,
            &self.feature_counter,
            len_batch,
        );
        let fresh_b = code.t().dot(&x_subset) * scale;

        Zip::from(self.b.rows_mut())
            .and(fresh_b.rows())
            .par_for_each(|mut b, fresh| {
                for (pos, &j) in subset.iter().enumerate() {
                    let w = column_weights[pos];
                    b[j] = (1. - w) * b[j] + w * fresh[pos];
                }
            });
    }

    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }

    pub fn g_average(&self) -> &Array2<f64> {
        &self.g_average
    }

    pub fn dx_average(&self) -> Array2<f64> {
        self.dx_average.to_array()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_counter.len()
    }

    pub fn sample_counter(&self) -> Array1<u64> {
        self.sample_counter
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub fn feature_counter(&self) -> &[u64] {
        &self.feature_counter
    }

    pub fn total_counter(&self) -> u64 {
        self.total_counter
    }
}
