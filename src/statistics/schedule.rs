/// A decaying learning rate `((1 + offset) / (offset + n))^rate`, equal to one on the first step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub rate: f64,
    pub offset: f64,
}

impl Schedule {
    pub fn new(rate: f64, offset: f64) -> Self {
        Self { rate, offset }
    }

    /// The weight of the `n`-th observation, `n` starting at one.
    #[inline]
    pub fn rate(&self, n: u64) -> f64 {
        let n = n.max(1) as f64;
        ((1. + self.offset) / (self.offset + n)).powf(self.rate).min(1.)
    }

    /// The weight of a whole batch ending at observation `count`.
    ///
    /// Folding the `len` observations `count - len + 1 ..= count` one at a time leaves a
    /// `prod(1 - rate(t))` share to the old average, the batch weight is the complement.
    ///
    /// # Arguments
    /// * `count` - The observation count once the batch is included.
    /// * `len` - The size of the batch.
    pub fn batch_weight(&self, count: u64, len: usize) -> f64 {
        let first = count.saturating_sub(len as u64).saturating_add(1).max(1);
        let kept = (first..=count).fold(1., |kept, t| kept * (1. - self.rate(t)));

        (1. - kept).clamp(0., 1.)
    }
}
