use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use super::AtomGen;
use crate::Result;

/// An atom generator drawing every entry from a standard normal distribution.
pub struct RandAtomGen<'a, R: Rng> {
    rng: &'a mut R,
}

impl<'a, R: Rng> RandAtomGen<'a, R> {
    /// Creates a new `RandAtomGen` atom generator.
    ///
    /// # Arguments
    /// * `rng` - The random number generator to draw from.
    pub fn new(rng: &'a mut R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> AtomGen for RandAtomGen<'_, R> {
    fn generate(&mut self, n_components: usize, n_features: usize) -> Result<Array2<f64>> {
        Ok(Array2::random_using(
            (n_components, n_features),
            StandardNormal,
            &mut *self.rng,
        ))
    }
}
