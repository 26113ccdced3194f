use ndarray::Array2;

use super::AtomGen;
use crate::{DictErr, Result};

/// An atom generator handing out a user provided dictionary.
pub struct GivenAtomGen<'a> {
    atoms: &'a Array2<f64>,
}

impl<'a> GivenAtomGen<'a> {
    pub fn new(atoms: &'a Array2<f64>) -> Self {
        Self { atoms }
    }
}

impl AtomGen for GivenAtomGen<'_> {
    fn generate(&mut self, n_components: usize, n_features: usize) -> Result<Array2<f64>> {
        let expected = (n_components, n_features);

        if self.atoms.dim() != expected {
            return Err(DictErr::DictInitShape {
                got: self.atoms.dim(),
                expected,
            });
        }

        Ok(self.atoms.clone())
    }
}
