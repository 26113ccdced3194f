use log::trace;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, seq::SliceRandom};

use super::Dictionary;
use crate::{
    DictErr, Result,
    projection::{RADIUS, enet_norm, enet_projection},
    solver::gram_matrix,
};

/// Floor of the `A[k, k]` step denominator.
const MIN_CURVATURE: f64 = 1e-12;

/// Block coordinate descent on the atoms restricted to a feature subset.
#[derive(Debug, Clone, Copy)]
pub struct DictionaryUpdater {
    pub l1_ratio: f64,
    pub shuffle: bool,
}

impl DictionaryUpdater {
    pub fn new(l1_ratio: f64, shuffle: bool) -> Self {
        Self { l1_ratio, shuffle }
    }

    /// Moves the atoms towards the minimizer of the surrogate `0.5 tr(D^T A D) - tr(D^T B)` on the
    /// columns of `subset`, one atom at a time.
    ///
    /// Every atom is projected back onto the share of the elastic-net ball its untouched columns
    /// leave, so whole rows stay feasible. The gram matrix is down-dated by the old columns and
    /// up-dated by the new ones, or recomputed when the subset spans every feature. Nothing is
    /// written back if an atom blows up.
    ///
    /// # Arguments
    /// * `dict` - The dictionary to update.
    /// * `a` - The code covariance statistic.
    /// * `b` - The code-data correlation statistic.
    /// * `subset` - The sorted features to update.
    /// * `rng` - Used to shuffle the atom order when enabled.
    ///
    /// # Returns
    /// A `NonFinite` error if an updated atom isn't finite.
    pub fn update<R: Rng>(
        &self,
        dict: &mut Dictionary,
        a: &Array2<f64>,
        b: &Array2<f64>,
        subset: &[usize],
        rng: &mut R,
    ) -> Result<()> {
        let n_components = dict.n_components();
        let full = subset.len() == dict.n_features();

        let mut d_subset = dict.columns(subset);
        let b_subset = b.select(Axis(1), subset);
        let old_gram = (!full).then(|| gram_matrix(d_subset.view()));

        // Penalty budget already spent by the columns outside the subset.
        let spent: Array1<f64> = if full {
            Array1::zeros(n_components)
        } else {
            dict.atoms()
                .rows()
                .into_iter()
                .zip(d_subset.rows())
                .map(|(row, sub)| enet_norm(row, self.l1_ratio) - enet_norm(sub, self.l1_ratio))
                .collect()
        };

        let mut order: Vec<_> = (0..n_components).collect();
        if self.shuffle {
            order.shuffle(rng);
        }

        for k in order {
            let residual = &b_subset.row(k) - &a.row(k).dot(&d_subset);
            let step = 1. / a[[k, k]].max(MIN_CURVATURE);

            let mut atom = d_subset.row_mut(k);
            atom.scaled_add(step, &residual);

            let radius = (RADIUS - spent[k]).max(0.);
            enet_projection(atom, radius, self.l1_ratio);
        }

        if d_subset.iter().any(|v| !v.is_finite()) {
            return Err(DictErr::NonFinite("dictionary"));
        }

        let atoms = dict.atoms_mut();
        for (pos, &j) in subset.iter().enumerate() {
            atoms.column_mut(j).assign(&d_subset.column(pos));
        }

        match old_gram {
            Some(old_gram) => dict.shift_gram(&old_gram, &gram_matrix(d_subset.view())),
            None => dict.refresh_gram(),
        }

        trace!(features = subset.len(), shuffled = self.shuffle; "dictionary updated");
        Ok(())
    }
}
