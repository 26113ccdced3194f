use log::debug;
use rand::Rng;

use crate::{
    DictFactConfig, Result,
    dictionary::Dictionary,
    initialization::{GivenAtomGen, RandAtomGen},
    sampling::SubsetSampler,
    statistics::Statistics,
};

/// Everything a fitted engine owns, allocated once on the first batch.
#[derive(Debug)]
pub(super) struct FitState {
    pub(super) dictionary: Dictionary,
    pub(super) stats: Statistics,
    pub(super) sampler: SubsetSampler,
}

impl FitState {
    /// Allocates the state of an engine seeing `n_features` features and `n_samples` samples.
    ///
    /// The dictionary comes from `dict_init` when given, from standard normal draws otherwise.
    ///
    /// # Returns
    /// A `DictInitShape` error if `dict_init` doesn't span `n_features` features.
    pub(super) fn init<R: Rng>(
        config: &DictFactConfig,
        n_features: usize,
        n_samples: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let n_components = config.n_components.get();

        let dictionary = match &config.dict_init {
            Some(atoms) => Dictionary::generate(
                &mut GivenAtomGen::new(atoms),
                n_components,
                n_features,
                config.l1_ratio,
            )?,
            None => Dictionary::generate(
                &mut RandAtomGen::new(rng),
                n_components,
                n_features,
                config.l1_ratio,
            )?,
        };

        debug!(
            n_components = n_components,
            n_features = n_features,
            n_samples = n_samples;
            "allocated factorization state"
        );

        Ok(Self {
            dictionary,
            stats: Statistics::new(n_components, n_features, n_samples),
            sampler: SubsetSampler::new(n_features, rng),
        })
    }

    pub(super) fn n_features(&self) -> usize {
        self.dictionary.n_features()
    }

    pub(super) fn n_samples(&self) -> usize {
        self.stats.n_samples()
    }
}
