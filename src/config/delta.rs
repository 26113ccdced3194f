use std::num::NonZeroUsize;

use ndarray::Array2;

use super::{DictFactConfig, DictReduction, Solver, SubsetSampling, Weights};
use crate::{DictErr, Result};

/// Generates a chainable setter per field, each one marking the field as changed.
macro_rules! setters {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        $(
            pub fn $field(mut self, value: $ty) -> Self {
                self.$field = Some(value);
                self
            }
        )+
    };
}

/// A set of hyperparameter changes to apply on a live engine.
///
/// Fields left as `None` keep their current value. The whole delta is validated before anything
/// is committed, a rejected delta leaves the configuration untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigDelta {
    alpha: Option<f64>,
    l1_ratio: Option<f64>,
    pen_l1_ratio: Option<f64>,
    tol: Option<f64>,
    learning_rate: Option<f64>,
    sample_learning_rate: Option<f64>,
    offset: Option<f64>,
    batch_size: Option<NonZeroUsize>,
    reduction: Option<f64>,
    solver: Option<Solver>,
    weights: Option<Weights>,
    subset_sampling: Option<SubsetSampling>,
    dict_reduction: Option<DictReduction>,
    shuffle_components: Option<bool>,
    max_n_iter: Option<u64>,
    n_epochs: Option<NonZeroUsize>,
    random_state: Option<u64>,
    verbose: Option<usize>,

    // Sealed after initialization.
    n_components: Option<NonZeroUsize>,
    n_samples: Option<NonZeroUsize>,
    n_threads: Option<NonZeroUsize>,
    dict_init: Option<Array2<f64>>,
}

impl ConfigDelta {
    pub fn new() -> Self {
        Self::default()
    }

    setters! {
        alpha: f64,
        l1_ratio: f64,
        pen_l1_ratio: f64,
        tol: f64,
        learning_rate: f64,
        sample_learning_rate: f64,
        offset: f64,
        batch_size: NonZeroUsize,
        reduction: f64,
        solver: Solver,
        weights: Weights,
        subset_sampling: SubsetSampling,
        dict_reduction: DictReduction,
        shuffle_components: bool,
        max_n_iter: u64,
        n_epochs: NonZeroUsize,
        random_state: u64,
        verbose: usize,
        n_components: NonZeroUsize,
        n_samples: NonZeroUsize,
        n_threads: NonZeroUsize,
        dict_init: Array2<f64>,
    }

    /// Names the sealed fields this delta tries to change.
    fn sealed_fields(&self) -> Option<&'static str> {
        [
            ("n_components", self.n_components.is_some()),
            ("n_samples", self.n_samples.is_some()),
            ("n_threads", self.n_threads.is_some()),
            ("dict_init", self.dict_init.is_some()),
        ]
        .into_iter()
        .find_map(|(name, set)| set.then_some(name))
    }

    /// Produces the configuration resulting from applying this delta.
    ///
    /// # Arguments
    /// * `config` - The current configuration.
    /// * `sealed` - Whether the engine is already initialized.
    ///
    /// # Returns
    /// The next configuration, a `SealedParam` error if a sealed field is changed on an
    /// initialized engine or an `InvalidParam` error if the result is out of range.
    pub(crate) fn apply(self, config: &DictFactConfig, sealed: bool) -> Result<DictFactConfig> {
        if let Some(name) = self.sealed_fields().filter(|_| sealed) {
            return Err(DictErr::SealedParam(name));
        }

        let mut next = config.clone();

        macro_rules! assign {
            ($($field:ident),+) => {
                $(if let Some(value) = self.$field {
                    next.$field = value;
                })+
            };
        }

        assign!(
            alpha,
            l1_ratio,
            pen_l1_ratio,
            tol,
            learning_rate,
            offset,
            batch_size,
            reduction,
            solver,
            weights,
            subset_sampling,
            dict_reduction,
            shuffle_components,
            max_n_iter,
            n_epochs,
            verbose,
            n_components,
            n_threads
        );

        if let Some(rate) = self.sample_learning_rate {
            next.sample_learning_rate = Some(rate);
        }

        if let Some(seed) = self.random_state {
            next.random_state = Some(seed);
        }

        if let Some(n_samples) = self.n_samples {
            next.n_samples = Some(n_samples);
        }

        if let Some(dict_init) = self.dict_init {
            next.dict_init = Some(dict_init);
        }

        next.validate()?;
        Ok(next)
    }
}
