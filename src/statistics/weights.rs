use super::Schedule;
use crate::Weights;

impl Weights {
    /// The per-column weights of the `B` update on `subset`.
    ///
    /// Synchronous weights scale the batch weight by the reduction, the inverse of the chance a
    /// feature has to be observed. Asynchronous weights follow each feature's own count.
    ///
    /// # Arguments
    /// * `schedule` - The schedule of the code statistics.
    /// * `batch_weight` - The weight of the `A` update.
    /// * `reduction` - The effective reduction of the subset.
    /// * `subset` - The observed features.
    /// * `feature_counter` - Per-feature observation counts, this batch included.
    /// * `len_batch` - The size of the batch.
    pub(crate) fn column_weights(
        &self,
        schedule: &Schedule,
        batch_weight: f64,
        reduction: f64,
        subset: &[usize],
        feature_counter: &[u64],
        len_batch: usize,
    ) -> Vec<f64> {
        match self {
            Weights::Sync => vec![(reduction * batch_weight).min(1.); subset.len()],
            Weights::Async => subset
                .iter()
                .map(|&j| schedule.batch_weight(feature_counter[j], len_batch))
                .collect(),
        }
    }
}
