use log::trace;
use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;

use super::state::FitState;
use crate::{
    DictFactConfig, Result, Solver, SubsetSampling, Weights,
    dictionary::DictionaryUpdater,
    solver::{CodeSolver, gram_matrix},
    statistics::Schedule,
};

/// The policies of a `partial_fit` call, resolved once from the configuration.
#[derive(Debug, Clone, Copy)]
pub(super) struct Plan {
    solver: Solver,
    weights: Weights,
    sampling: SubsetSampling,
    reduction: f64,
    dict_reduction: Option<f64>,
    code_solver: CodeSolver,
    updater: DictionaryUpdater,
    schedule: Schedule,
    sample_schedule: Schedule,
}

impl Plan {
    pub(super) fn new(config: &DictFactConfig) -> Self {
        Self {
            solver: config.solver,
            weights: config.weights,
            sampling: config.subset_sampling,
            reduction: config.reduction,
            dict_reduction: config.dict_reduction.factor(config.reduction),
            code_solver: CodeSolver::from_config(config),
            updater: DictionaryUpdater::new(config.l1_ratio, config.shuffle_components),
            schedule: Schedule::new(config.learning_rate, config.offset),
            sample_schedule: Schedule::new(config.effective_sample_learning_rate(), config.offset),
        }
    }
}

impl FitState {
    /// Runs one mini-batch: subset sampling, code solve, statistics and dictionary updates.
    ///
    /// Only the average solver writes before its codes are solved: the sample counters and the
    /// `Dx_average` rows of the batch. Everything else is written once the solve succeeded.
    ///
    /// # Arguments
    /// * `plan` - The resolved policies.
    /// * `x` - The mini-batch, already validated.
    /// * `samples` - The sample index of every row of `x`.
    /// * `rng` - The engine's random number generator.
    ///
    /// # Returns
    /// The codes of the mini-batch and the observed subset, or the numerical error that aborted it.
    pub(super) fn step<R: Rng>(
        &mut self,
        plan: &Plan,
        x: ArrayView2<f64>,
        samples: &[usize],
        rng: &mut R,
    ) -> Result<(Array2<f64>, Vec<usize>)> {
        let len_batch = x.nrows();
        let n_features = self.n_features();

        let subset = self.sampler.select(plan.reduction, plan.sampling, rng);
        let reduction = n_features as f64 / subset.len() as f64;

        let x_subset = x.select(Axis(1), &subset);
        let d_subset = self.dictionary.columns(&subset);
        let subset_gram = gram_matrix(d_subset.view());

        let mut code = Array2::zeros((len_batch, self.dictionary.n_components()));

        match plan.solver {
            Solver::Masked => {
                let dx = x_subset.dot(&d_subset.t()) * reduction;
                plan.code_solver
                    .solve(&(subset_gram * reduction), dx.view(), code.view_mut())?;
                self.stats.advance(samples);
            }
            Solver::Gram => {
                let dx = x_subset.dot(&d_subset.t()) * reduction;
                plan.code_solver
                    .solve(self.dictionary.gram(), dx.view(), code.view_mut())?;
                self.stats.advance(samples);
            }
            Solver::Average => {
                // The per-sample rates read this batch's visit counts.
                self.stats.advance(samples);
                let g_average = self.stats.folded_gram_average(
                    &plan.sample_schedule,
                    len_batch,
                    reduction,
                    &subset_gram,
                );

                let fresh = x_subset.dot(&d_subset.t());
                let mut dx = Array2::zeros(code.raw_dim());
                self.stats.fold_correlations(
                    &plan.sample_schedule,
                    samples,
                    reduction,
                    fresh.view(),
                    dx.view_mut(),
                );
                plan.code_solver
                    .solve(&g_average, dx.view(), code.view_mut())?;
                self.stats.commit_gram_average(g_average);
            }
        }

        self.stats.observe(&subset, len_batch);
        self.stats.update(
            &plan.schedule,
            plan.weights,
            reduction,
            &subset,
            x_subset.view(),
            code.view(),
        );

        let dict_subset = match plan.dict_reduction {
            Some(factor) => self.sampler.select(factor, plan.sampling, rng),
            None => subset.clone(),
        };

        plan.updater.update(
            &mut self.dictionary,
            self.stats.a(),
            self.stats.b(),
            &dict_subset,
            rng,
        )?;

        trace!(
            total = self.stats.total_counter(),
            len_batch = len_batch,
            features = subset.len();
            "mini-batch done"
        );

        Ok((code, subset))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{dictionary::Dictionary, sampling::SubsetSampler, statistics::Statistics};

    fn overflowing_state(rng: &mut StdRng) -> FitState {
        FitState {
            dictionary: Dictionary::new(Array2::from_elem((2, 6), 1e200)),
            stats: Statistics::new(2, 6, 4),
            sampler: SubsetSampler::new(6, rng),
        }
    }

    #[test]
    fn failed_solve_leaves_the_statistics_untouched() {
        let x = Array2::from_shape_fn((3, 6), |(i, j)| (i + j) as f64);

        for solver in [Solver::Masked, Solver::Gram, Solver::Average] {
            let mut rng = StdRng::seed_from_u64(0);
            let mut state = overflowing_state(&mut rng);
            let config = DictFactConfig {
                solver,
                reduction: 2.,
                ..Default::default()
            };

            let err = state
                .step(&Plan::new(&config), x.view(), &[0, 1, 2], &mut rng)
                .unwrap_err();

            assert_eq!(err.kind(), crate::ErrKind::Numerical, "{solver}");
            assert_eq!(state.stats.g_average(), Array2::<f64>::zeros((2, 2)));
            assert_eq!(state.stats.b(), Array2::<f64>::zeros((2, 6)));
            assert!(state.stats.feature_counter().iter().all(|&c| c == 0));

            // The average solver reads this batch's visit counts before solving.
            let expected = if solver == Solver::Average { 3 } else { 0 };
            assert_eq!(state.stats.total_counter(), expected, "{solver}");
        }
    }

    #[test]
    fn every_solver_counts_each_sample_once() {
        let x = Array2::from_shape_fn((4, 6), |(i, j)| ((i * 7 + j * 3) % 5) as f64 - 2.);

        for solver in [Solver::Masked, Solver::Gram, Solver::Average] {
            let mut rng = StdRng::seed_from_u64(1);
            let config = DictFactConfig {
                solver,
                reduction: 3.,
                ..Default::default()
            };
            let mut state = FitState::init(&config, 6, 4, &mut rng).unwrap();
            let plan = Plan::new(&config);

            state.step(&plan, x.view(), &[0, 1, 2, 3], &mut rng).unwrap();
            state.step(&plan, x.view(), &[3, 3, 1, 0], &mut rng).unwrap();

            let counter = state.stats.sample_counter();
            assert_eq!(counter.to_vec(), [2, 2, 1, 3], "{solver}");
            assert_eq!(counter.sum(), state.stats.total_counter());
            assert_eq!(state.stats.feature_counter().iter().sum::<u64>(), 2 * 4 * 2);
        }
    }
}
