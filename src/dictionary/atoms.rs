use ndarray::{Array2, Axis, Zip};

use crate::{
    Result,
    initialization::AtomGen,
    projection::{RADIUS, scaled_rows},
    solver::gram_matrix,
};

/// Incremental gram updates between two exact recomputations.
pub const GRAM_REFRESH: usize = 100;

/// The learned atoms together with their gram matrix.
///
/// Subset updates shift the gram incrementally, it is recomputed from the atoms every
/// `GRAM_REFRESH` shifts so rounding can't pile up.
#[derive(Debug, Clone)]
pub struct Dictionary {
    atoms: Array2<f64>,
    gram: Array2<f64>,
    shifts: usize,
}

impl Dictionary {
    /// Creates a new `Dictionary` from the atoms of `atom_gen`, rescaled onto the elastic-net
    /// sphere.
    ///
    /// # Arguments
    /// * `atom_gen` - Where the raw atoms come from.
    /// * `n_components` - The amount of atoms.
    /// * `n_features` - The amount of features.
    /// * `l1_ratio` - The elastic-net mix of the atom constraint.
    ///
    /// # Returns
    /// The dictionary or the generator's error.
    pub fn generate<G: AtomGen>(
        atom_gen: &mut G,
        n_components: usize,
        n_features: usize,
        l1_ratio: f64,
    ) -> Result<Self> {
        let raw = atom_gen.generate(n_components, n_features)?;
        Ok(Self::new(scaled_rows(&raw, RADIUS, l1_ratio)))
    }

    pub fn new(atoms: Array2<f64>) -> Self {
        let gram = gram_matrix(atoms.view());
        Self {
            atoms,
            gram,
            shifts: 0,
        }
    }

    pub fn atoms(&self) -> &Array2<f64> {
        &self.atoms
    }

    pub fn gram(&self) -> &Array2<f64> {
        &self.gram
    }

    pub fn n_components(&self) -> usize {
        self.atoms.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.atoms.ncols()
    }

    /// Copies the columns of `subset` out of the atoms.
    pub fn columns(&self, subset: &[usize]) -> Array2<f64> {
        self.atoms.select(Axis(1), subset)
    }

    /// The atoms rescaled onto the elastic-net sphere.
    pub fn scaled(&self, l1_ratio: f64) -> Array2<f64> {
        scaled_rows(&self.atoms, RADIUS, l1_ratio)
    }

    pub(super) fn atoms_mut(&mut self) -> &mut Array2<f64> {
        &mut self.atoms
    }

    /// Adds `new_gram - old_gram` to the gram, the grams of the rewritten columns before and
    /// after the update.
    pub(super) fn shift_gram(&mut self, old_gram: &Array2<f64>, new_gram: &Array2<f64>) {
        self.shifts += 1;
        if self.shifts >= GRAM_REFRESH {
            self.refresh_gram();
            return;
        }

        Zip::from(&mut self.gram)
            .and(old_gram)
            .and(new_gram)
            .for_each(|g, old, new| *g += new - old);
    }

    pub(super) fn refresh_gram(&mut self) {
        self.gram = gram_matrix(self.atoms.view());
        self.shifts = 0;
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        initialization::{GivenAtomGen, RandAtomGen},
        projection::enet_norm,
    };

    #[test]
    fn generated_atoms_lie_on_the_sphere() {
        let mut rng = StdRng::seed_from_u64(0);

        for l1_ratio in [0., 0.5, 1.] {
            let dict =
                Dictionary::generate(&mut RandAtomGen::new(&mut rng), 4, 9, l1_ratio).unwrap();

            for row in dict.atoms().rows() {
                assert!((enet_norm(row, l1_ratio) - RADIUS).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn given_atoms_are_rescaled() {
        let init = ndarray::array![[2., 0.], [0., 0.5]];
        let dict = Dictionary::generate(&mut GivenAtomGen::new(&init), 2, 2, 0.).unwrap();

        assert_eq!(dict.atoms(), &ndarray::array![[1., 0.], [0., 1.]]);
        assert_eq!(dict.gram(), &Array2::<f64>::eye(2));
    }
}
