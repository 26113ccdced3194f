mod delta;
mod options;

use std::num::NonZeroUsize;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub use delta::ConfigDelta;
pub use options::{DictReduction, Solver, SubsetSampling, Weights};

use crate::{DictErr, Result};

const DEFAULT_COMPONENTS: NonZeroUsize = NonZeroUsize::new(30).unwrap();

/// Every knob of a `DictFact` engine.
///
/// `n_components`, `n_samples`, `n_threads` and `dict_init` are sealed once the engine has seen
/// its first batch, the rest can be swapped between `partial_fit` calls through a `ConfigDelta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DictFactConfig {
    pub n_components: NonZeroUsize,
    /// Code penalty strength.
    pub alpha: f64,
    /// Elastic-net mix of the dictionary constraint, `0` is a plain L2 ball.
    pub l1_ratio: f64,
    /// Elastic-net mix of the code penalty, `0` is ridge.
    pub pen_l1_ratio: f64,
    /// Relative tolerance of the coordinate descent code solver.
    pub tol: f64,

    pub learning_rate: f64,
    /// Defaults to `2.5 - 2 * learning_rate`.
    pub sample_learning_rate: Option<f64>,
    pub offset: f64,
    pub batch_size: NonZeroUsize,

    /// One feature out of `reduction` is observed per mini-batch.
    pub reduction: f64,
    pub solver: Solver,
    pub weights: Weights,
    pub subset_sampling: SubsetSampling,
    pub dict_reduction: DictReduction,
    /// Visit the dictionary rows in a seeded random order on every update.
    pub shuffle_components: bool,

    /// Size of the per-sample statistics, inferred from the first batch when missing.
    pub n_samples: Option<NonZeroUsize>,
    /// Budget of processed samples, `0` means unbounded.
    pub max_n_iter: u64,
    pub n_epochs: NonZeroUsize,
    pub random_state: Option<u64>,
    pub n_threads: NonZeroUsize,
    pub verbose: usize,

    #[serde(skip)]
    pub dict_init: Option<Array2<f64>>,
}

impl Default for DictFactConfig {
    fn default() -> Self {
        Self {
            n_components: DEFAULT_COMPONENTS,
            alpha: 1.,
            l1_ratio: 0.,
            pen_l1_ratio: 0.,
            tol: 1e-3,
            learning_rate: 1.,
            sample_learning_rate: None,
            offset: 0.,
            batch_size: NonZeroUsize::MIN,
            reduction: 1.,
            solver: Solver::default(),
            weights: Weights::default(),
            subset_sampling: SubsetSampling::default(),
            dict_reduction: DictReduction::default(),
            shuffle_components: false,
            n_samples: None,
            max_n_iter: 0,
            n_epochs: NonZeroUsize::MIN,
            random_state: None,
            n_threads: NonZeroUsize::MIN,
            verbose: 0,
            dict_init: None,
        }
    }
}

impl DictFactConfig {
    /// Parses and validates a configuration written as JSON.
    ///
    /// # Arguments
    /// * `json` - The serialized configuration, missing fields take their default value.
    ///
    /// # Returns
    /// The configuration or a config error if it is malformed or out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The decay exponent of the per-sample statistics.
    pub fn effective_sample_learning_rate(&self) -> f64 {
        self.sample_learning_rate
            .unwrap_or(2.5 - 2. * self.learning_rate)
    }

    /// Checks every range constraint of the configuration.
    ///
    /// # Returns
    /// An `InvalidParam` error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        non_negative("alpha", self.alpha)?;
        unit_interval("l1_ratio", self.l1_ratio)?;
        unit_interval("pen_l1_ratio", self.pen_l1_ratio)?;
        positive("tol", self.tol)?;
        positive("learning_rate", self.learning_rate)?;
        non_negative("sample_learning_rate", self.effective_sample_learning_rate())?;
        non_negative("offset", self.offset)?;
        at_least_one("reduction", self.reduction)?;

        if let DictReduction::Factor(factor) = self.dict_reduction {
            at_least_one("dict_reduction", factor)?;
        }

        if let Some(dict_init) = &self.dict_init {
            if dict_init.nrows() != self.n_components.get() {
                return Err(DictErr::DictInitShape {
                    got: dict_init.dim(),
                    expected: (self.n_components.get(), dict_init.ncols()),
                });
            }

            if dict_init.iter().any(|v| !v.is_finite()) {
                return Err(DictErr::invalid("dict_init", "contains non-finite values"));
            }
        }

        Ok(())
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.) {
        return Err(DictErr::invalid(name, format!("expected a finite value >= 0, got {value}")));
    }

    Ok(())
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.) {
        return Err(DictErr::invalid(name, format!("expected a finite value > 0, got {value}")));
    }

    Ok(())
}

fn unit_interval(name: &'static str, value: f64) -> Result<()> {
    if !(0. ..=1.).contains(&value) {
        return Err(DictErr::invalid(name, format!("expected a value in [0, 1], got {value}")));
    }

    Ok(())
}

fn at_least_one(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 1.) {
        return Err(DictErr::invalid(name, format!("expected a finite value >= 1, got {value}")));
    }

    Ok(())
}
