use rand::{Rng, seq::SliceRandom};

use crate::SubsetSampling;

/// Size of the feature subset observed per mini-batch, at least one feature.
pub fn subset_len(n_features: usize, reduction: f64) -> usize {
    ((n_features as f64 / reduction).floor() as usize).clamp(1, n_features.max(1))
}

/// Picks the feature subset every mini-batch observes.
///
/// Random subsets are partial Fisher-Yates shuffles of a persistent permutation. Cyclic subsets
/// are contiguous blocks of an ordering fixed at creation, walked by a cursor that wraps around.
#[derive(Debug, Clone)]
pub struct SubsetSampler {
    permutation: Vec<usize>,
    order: Vec<usize>,
    cursor: usize,
}

impl SubsetSampler {
    /// Creates a new `SubsetSampler`.
    ///
    /// # Arguments
    /// * `n_features` - The size of the feature set.
    /// * `rng` - Used to fix the cyclic ordering.
    ///
    /// # Returns
    /// A new `SubsetSampler` instance.
    pub fn new<R: Rng>(n_features: usize, rng: &mut R) -> Self {
        let permutation: Vec<_> = (0..n_features).collect();
        let mut order = permutation.clone();
        order.shuffle(rng);

        Self {
            permutation,
            order,
            cursor: 0,
        }
    }

    pub fn n_features(&self) -> usize {
        self.permutation.len()
    }

    /// Draws the subset of the next mini-batch.
    ///
    /// # Arguments
    /// * `reduction` - One feature out of `reduction` is drawn.
    /// * `sampling` - How the subset is drawn.
    /// * `rng` - The random number generator.
    ///
    /// # Returns
    /// The sorted feature indices.
    pub fn select<R: Rng>(
        &mut self,
        reduction: f64,
        sampling: SubsetSampling,
        rng: &mut R,
    ) -> Vec<usize> {
        let n_features = self.n_features();
        let len = subset_len(n_features, reduction);

        if len == n_features {
            return (0..n_features).collect();
        }

        let mut subset = match sampling {
            SubsetSampling::Random => {
                let (chosen, _) = self.permutation.partial_shuffle(rng, len);
                chosen.to_vec()
            }
            SubsetSampling::Cyclic => {
                let subset: Vec<_> = (0..len)
                    .map(|i| self.order[(self.cursor + i) % n_features])
                    .collect();

                self.cursor = (self.cursor + len) % n_features;
                subset
            }
        };

        subset.sort_unstable();
        subset
    }
}
