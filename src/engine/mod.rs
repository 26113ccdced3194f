mod snapshot;
mod state;
mod step;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::{ThreadPool, ThreadPoolBuilder};

pub use snapshot::Snapshot;

use self::{state::FitState, step::Plan};
use crate::{
    ConfigDelta, DictErr, DictFactConfig, Result,
    solver::{CodeSolver, gram_matrix},
};

/// An observer called at the end of every mini-batch.
pub type Callback = Box<dyn FnMut(&Snapshot<'_>) + Send>;

/// An online dictionary learning engine.
///
/// Learns `n_components` atoms from a stream of dense rows, observing a random subset of the
/// features of every mini-batch. The state is allocated on the first batch and only updated in
/// place afterwards.
pub struct DictFact {
    config: DictFactConfig,
    rng: StdRng,
    state: Option<FitState>,
    pool: Option<ThreadPool>,
    callback: Option<Callback>,
}

impl DictFact {
    /// Creates a new uninitialized `DictFact` engine.
    ///
    /// # Arguments
    /// * `config` - The engine's configuration.
    ///
    /// # Returns
    /// The engine or an `InvalidParam` error if the configuration is out of range.
    pub fn new(config: DictFactConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            config,
            rng,
            state: None,
            pool: None,
            callback: None,
        })
    }

    /// Registers an observer called with a read-only snapshot after every mini-batch.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Snapshot<'_>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &DictFactConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Applies a validated set of hyperparameter changes.
    ///
    /// # Returns
    /// A `SealedParam` error if the delta changes a field frozen by initialization, or an
    /// `InvalidParam` error if the resulting configuration is out of range. Either way the
    /// current configuration is kept.
    pub fn set_params(&mut self, delta: ConfigDelta) -> Result<()> {
        let next = delta.apply(&self.config, self.is_initialized())?;

        if next.random_state != self.config.random_state {
            if let Some(seed) = next.random_state {
                self.rng = StdRng::seed_from_u64(seed);
            }
        }

        info!(
            reduction = next.reduction,
            alpha = next.alpha;
            "hyperparameters updated, solver={}", next.solver
        );

        self.config = next;
        Ok(())
    }

    /// Learns from a batch of rows, mini-batch by mini-batch.
    ///
    /// The engine initializes itself on the first call. Once `max_n_iter` samples have been
    /// processed the remaining rows are dropped.
    ///
    /// # Arguments
    /// * `x` - The rows, one sample each.
    /// * `sample_indices` - The index of every row in the stream, `0..n_rows` when missing.
    ///
    /// # Returns
    /// The amount of rows processed, or an input error if the batch is rejected before any state
    /// is touched, or the numerical error that aborted the call.
    pub fn partial_fit(
        &mut self,
        x: ArrayView2<f64>,
        sample_indices: Option<&[usize]>,
    ) -> Result<usize> {
        let default_indices: Vec<usize>;
        let samples = match sample_indices {
            Some(indices) => indices,
            None => {
                default_indices = (0..x.nrows()).collect();
                &default_indices
            }
        };

        self.validate_batch(x, samples)?;

        if x.nrows() == 0 {
            return Ok(0);
        }

        self.ensure_initialized(x.ncols(), samples)?;

        let Some(state) = self.state.as_mut() else {
            return Err(DictErr::NotFitted);
        };
        let Some(pool) = self.pool.as_ref() else {
            return Err(DictErr::NotFitted);
        };

        let n_rows = budgeted_rows(x.nrows(), state.stats.total_counter(), self.config.max_n_iter);
        if n_rows < x.nrows() {
            debug!(
                dropped = x.nrows() - n_rows,
                max_n_iter = self.config.max_n_iter;
                "budget reached, truncating batch"
            );
        }

        let plan = Plan::new(&self.config);
        let batch_size = self.config.batch_size.get();
        let rng = &mut self.rng;
        let callback = &mut self.callback;

        pool.install(|| -> Result<usize> {
            for start in (0..n_rows).step_by(batch_size) {
                let end = (start + batch_size).min(n_rows);
                let batch = x.slice(s![start..end, ..]);

                let (code, subset) = state.step(&plan, batch, &samples[start..end], rng)?;

                if let Some(callback) = callback.as_mut() {
                    callback(&Snapshot::new(state, code.view(), &subset));
                }
            }

            Ok(n_rows)
        })
    }

    /// Learns from a whole dataset.
    ///
    /// Runs `n_epochs` passes over `x` in a shuffled order, or as many passes as needed to
    /// exhaust `max_n_iter` when a budget is set.
    ///
    /// # Returns
    /// The amount of rows processed.
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<usize> {
        let mut processed = 0;
        let mut epoch = 0;

        loop {
            let budgeted = self.config.max_n_iter > 0;
            if !budgeted && epoch == self.config.n_epochs.get() {
                break;
            }

            let mut order: Vec<_> = (0..x.nrows()).collect();
            order.shuffle(&mut self.rng);
            let shuffled = x.select(Axis(0), &order);

            let n = self.partial_fit(shuffled.view(), Some(order.as_slice()))?;
            if n == 0 {
                break;
            }

            processed += n;
            epoch += 1;

            if self.config.verbose > 0 {
                let score = self.score(x)?;
                info!(epoch = epoch, score = score; "epoch done");
            } else {
                debug!(epoch = epoch, processed = processed; "epoch done");
            }

            if budgeted && n < x.nrows() {
                break;
            }
        }

        Ok(processed)
    }

    /// Computes the codes of `x` against the scaled dictionary, observing every feature.
    ///
    /// The engine is left untouched.
    ///
    /// # Returns
    /// The codes and the scaled dictionary they refer to, or `NotFitted` before the first batch.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        let (Some(state), Some(pool)) = (self.state.as_ref(), self.pool.as_ref()) else {
            return Err(DictErr::NotFitted);
        };

        check_features(x, state.n_features())?;
        check_finite(x)?;

        let components = state.dictionary.scaled(self.config.l1_ratio);
        let gram = gram_matrix(components.view());
        let dx = x.dot(&components.t());
        let mut code = Array2::zeros((x.nrows(), components.nrows()));
        let solver = CodeSolver::from_config(&self.config);

        pool.install(|| solver.solve(&gram, dx.view(), code.view_mut()))?;

        Ok((code, components))
    }

    /// The mean penalized reconstruction loss of `x`.
    pub fn score(&self, x: ArrayView2<f64>) -> Result<f64> {
        let (code, components) = self.transform(x)?;

        let residual = &x - &code.dot(&components);
        let loss = 0.5 * residual.iter().map(|r| r * r).sum::<f64>();
        let penalty = CodeSolver::from_config(&self.config).penalty(code.view());

        Ok((loss + penalty) / x.nrows().max(1) as f64)
    }

    /// The raw dictionary.
    pub fn dictionary(&self) -> Option<&Array2<f64>> {
        self.state.as_ref().map(|s| s.dictionary.atoms())
    }

    /// The dictionary with every atom rescaled onto the elastic-net sphere.
    pub fn components(&self) -> Option<Array2<f64>> {
        self.state
            .as_ref()
            .map(|s| s.dictionary.scaled(self.config.l1_ratio))
    }

    pub fn gram(&self) -> Option<&Array2<f64>> {
        self.state.as_ref().map(|s| s.dictionary.gram())
    }

    pub fn a(&self) -> Option<&Array2<f64>> {
        self.state.as_ref().map(|s| s.stats.a())
    }

    pub fn b(&self) -> Option<&Array2<f64>> {
        self.state.as_ref().map(|s| s.stats.b())
    }

    pub fn g_average(&self) -> Option<&Array2<f64>> {
        self.state.as_ref().map(|s| s.stats.g_average())
    }

    pub fn dx_average(&self) -> Option<Array2<f64>> {
        self.state.as_ref().map(|s| s.stats.dx_average())
    }

    pub fn total_counter(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |s| s.stats.total_counter())
    }

    pub fn sample_counter(&self) -> Option<Array1<u64>> {
        self.state.as_ref().map(|s| s.stats.sample_counter())
    }

    pub fn feature_counter(&self) -> Option<&[u64]> {
        self.state.as_ref().map(|s| s.stats.feature_counter())
    }

    /// Checks a batch against the engine before anything is mutated.
    fn validate_batch(&self, x: ArrayView2<f64>, samples: &[usize]) -> Result<()> {
        if samples.len() != x.nrows() {
            return Err(DictErr::SizeMismatch {
                what: "sample indices",
                got: samples.len(),
                expected: x.nrows(),
            });
        }

        let n_samples = match &self.state {
            Some(state) => {
                check_features(x, state.n_features())?;
                Some(state.n_samples())
            }
            None => self.config.n_samples.map(|n| n.get()),
        };

        if let Some(n_samples) = n_samples {
            if let Some(&index) = samples.iter().find(|&&i| i >= n_samples) {
                return Err(DictErr::SampleOutOfBounds { index, n_samples });
            }
        }

        check_finite(x)
    }

    fn ensure_initialized(&mut self, n_features: usize, samples: &[usize]) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }

        let n_samples = match self.config.n_samples {
            Some(n) => n.get(),
            None => samples.iter().map(|i| i + 1).max().unwrap_or(0).max(samples.len()),
        };

        let n_threads = self.config.n_threads.get();
        let pool = ThreadPoolBuilder::new().num_threads(n_threads).build()?;
        let state = FitState::init(&self.config, n_features, n_samples, &mut self.rng)?;

        info!(
            n_components = self.config.n_components.get(),
            n_features = n_features,
            n_samples = n_samples,
            n_threads = n_threads;
            "engine initialized"
        );

        self.state = Some(state);
        self.pool = Some(pool);
        Ok(())
    }
}

/// The amount of rows of a batch that fit in the remaining budget, `max_n_iter == 0` is unbounded.
fn budgeted_rows(n_rows: usize, total_counter: u64, max_n_iter: u64) -> usize {
    if max_n_iter == 0 {
        return n_rows;
    }

    let remaining = max_n_iter.saturating_sub(total_counter);
    n_rows.min(usize::try_from(remaining).unwrap_or(usize::MAX))
}

fn check_features(x: ArrayView2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(DictErr::SizeMismatch {
            what: "features",
            got: x.ncols(),
            expected: n_features,
        });
    }

    Ok(())
}

fn check_finite(x: ArrayView2<f64>) -> Result<()> {
    match x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), _)) => Err(DictErr::NonFiniteInput { row, col }),
        None => Ok(()),
    }
}
