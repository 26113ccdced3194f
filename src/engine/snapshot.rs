use ndarray::{Array2, ArrayView2};

use super::state::FitState;

/// A read-only view of the engine handed to the callback after every mini-batch.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    state: &'a FitState,
    code: ArrayView2<'a, f64>,
    subset: &'a [usize],
}

impl<'a> Snapshot<'a> {
    pub(super) fn new(state: &'a FitState, code: ArrayView2<'a, f64>, subset: &'a [usize]) -> Self {
        Self {
            state,
            code,
            subset,
        }
    }

    /// The raw, unscaled dictionary.
    pub fn dictionary(&self) -> &'a Array2<f64> {
        self.state.dictionary.atoms()
    }

    pub fn a(&self) -> &'a Array2<f64> {
        self.state.stats.a()
    }

    pub fn b(&self) -> &'a Array2<f64> {
        self.state.stats.b()
    }

    /// The codes of the mini-batch that just ran.
    pub fn code(&self) -> ArrayView2<'a, f64> {
        self.code
    }

    /// The features the mini-batch observed.
    pub fn subset(&self) -> &'a [usize] {
        self.subset
    }

    pub fn total_counter(&self) -> u64 {
        self.state.stats.total_counter()
    }
}
