mod given;
mod random;

use ndarray::Array2;

pub use given::GivenAtomGen;
pub use random::RandAtomGen;

use crate::Result;

/// Generates the starting atoms of a dictionary.
pub trait AtomGen {
    /// Generates `n_components` atoms over `n_features` features.
    ///
    /// # Returns
    /// The raw atoms, one per row, or an error if they can't be produced for this shape.
    fn generate(&mut self, n_components: usize, n_features: usize) -> Result<Array2<f64>>;
}
