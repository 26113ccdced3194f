use ndarray::{Array2, ArrayView1, ArrayViewMut1};
use parking_lot::Mutex;

/// A table of fixed size rows shared across threads, each row behind its own lock.
///
/// Tasks working on different rows never contend, two tasks landing on the same row are
/// serialized by its lock.
#[derive(Debug)]
pub struct RowStore {
    width: usize,
    rows: Box<[Mutex<Box<[f64]>>]>,
}

impl RowStore {
    /// Creates a new zeroed `RowStore`.
    ///
    /// # Arguments
    /// * `len` - The amount of rows.
    /// * `width` - The size of every row.
    ///
    /// # Returns
    /// A new `RowStore` instance.
    pub fn new(len: usize, width: usize) -> Self {
        let rows = (0..len)
            .map(|_| Mutex::new(vec![0.; width].into_boxed_slice()))
            .collect();

        Self { width, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Blends `values` into row `idx` as `row = (1 - weight) * row + weight * scale * values`
    /// and copies the blended row into `out`, all under the row's lock.
    ///
    /// # Arguments
    /// * `idx` - The row to update, must be in bounds.
    /// * `weight` - The blending weight in `[0, 1]`.
    /// * `scale` - A factor applied to `values` before blending.
    /// * `values` - The new observation, `width` long.
    /// * `out` - Where the blended row is copied to, `width` long.
    pub fn blend(
        &self,
        idx: usize,
        weight: f64,
        scale: f64,
        values: ArrayView1<f64>,
        mut out: ArrayViewMut1<f64>,
    ) {
        let mut row = self.rows[idx].lock();

        row.iter_mut()
            .zip(values.iter())
            .zip(out.iter_mut())
            .for_each(|((acc, v), o)| {
                *acc = (1. - weight) * *acc + weight * scale * v;
                *o = *acc;
            });
    }

    /// Copies row `idx` into `out`.
    pub fn pull(&self, idx: usize, mut out: ArrayViewMut1<f64>) {
        let row = self.rows[idx].lock();

        out.iter_mut().zip(row.iter()).for_each(|(o, v)| *o = *v);
    }

    /// Copies the whole table into a dense matrix.
    pub fn to_array(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.len(), self.width));

        for (idx, row) in out.rows_mut().into_iter().enumerate() {
            self.pull(idx, row);
        }

        out
    }
}
